use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// 구조화된 로깅을 초기화합니다.
/// JSON 형식의 로그를 출력하며, RUST_LOG 환경 변수로 로그 레벨을 제어합니다.
/// `log` 크레이트의 레코드(LoggerMiddleware 등)도 같은 구독자로 전달됩니다.
///
/// 이미 전역 구독자가 설치되어 있으면 `false`를 반환합니다.
pub fn init_telemetry() -> bool {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_initializes_once() {
        // 다른 테스트가 먼저 초기화했을 수 있으므로 첫 호출 결과는 확인하지 않습니다.
        let _ = init_telemetry();
        assert!(!init_telemetry());
    }
}
