#[tokio::main]
async fn main() {
    mingle_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let addr = bind_addr(std::env::var("BIND_ADDR").ok());

    let app = mingle_api::app::build_app(jwt_secret).await;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

fn bind_addr(env: Option<String>) -> String {
    env.unwrap_or_else(|| {
        tracing::warn!("BIND_ADDR not set; using dev default 0.0.0.0:8080");
        "0.0.0.0:8080".to_string()
    })
}
