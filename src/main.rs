use sketchgrade::config::ServiceConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sketchgrade::init_tracing();
    let config = ServiceConfig::load()?;
    sketchgrade::run(config).await
}
