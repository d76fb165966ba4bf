use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use infer::{AppContext, InferenceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    let mut args = std::env::args().skip(1);
    let usage = "usage: predict <text> <type,type,...> [config.json]";
    let text = args.next().context(usage)?;
    let types = args.next().context(usage)?;
    let config = match args.next() {
        Some(path) => InferenceConfig::load(&PathBuf::from(path)).await?,
        None => InferenceConfig::default(),
    };

    let context = AppContext::from_env(config)?;
    let entities = context.predictor().predict(&text, &types).await?;

    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}
