use std::net::TcpListener;
use std::sync::Arc;
use sqlx::postgres::PgPoolOptions;
use token_rotation::auth::TokenIssuer;
use token_rotation::configuration::get_configuration;
use token_rotation::startup::{run, AppState};
use token_rotation::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry();

    tracing::info!("Starting application");

    // 설정 로드
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error"
            ));
        }
    };

    // 서명 키 검증: 잘못된 키로는 서버를 시작하지 않습니다.
    let issuer = match TokenIssuer::new(configuration.jwt.clone()) {
        Ok(issuer) => Arc::new(issuer),
        Err(e) => {
            tracing::error!("Invalid signing configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Signing configuration error"
            ));
        }
    };

    // 데이터베이스 연결 풀 생성
    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error"
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
        })?;

    // 서버 주소 설정
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!(
        rotation_policy = ?configuration.jwt.rotation_policy,
        "Server listening on: {}",
        address
    );

    let server = run(listener, AppState::postgres(issuer, pool))?;
    tracing::info!("Server started successfully");

    server.await
}
