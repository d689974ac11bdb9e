use gitlab_provider::{init_logging, serve_with_options, GitlabProvider, ProviderError, ServeOptions};

#[tokio::main]
async fn main() -> Result<(), ProviderError> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting GitLab provider");

    let options = ServeOptions::from_env()?;
    serve_with_options(GitlabProvider::new(), options).await
}
