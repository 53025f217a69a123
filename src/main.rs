use docx_spacer_api::config::Config;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let app = docx_spacer_api::app(&config);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        converter = %config.soffice,
        caption_prefixes = ?config.rules.caption_prefixes,
        space_before_images = config.rules.space_before_images,
        "listening"
    );
    axum::serve(listener, app).await
}
