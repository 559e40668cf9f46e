use std::fs;

use anyhow::Context;
use tracing::{error, info};

use news_recommender::{
    LocalFileSource, ServingMode, Snapshot, SnapshotHandle, artifact, config::Config,
    observability,
};

fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    observability::init_tracing().context("failed to initialize tracing")?;
    let config = Config::from_env().context("failed to load configuration")?;

    fs::create_dir_all(config.model_dir()).with_context(|| {
        format!(
            "failed to create model directory {}",
            config.model_dir().display()
        )
    })?;

    let snapshot = Snapshot::prepare_with(
        config.data_dir(),
        &config.prepare_options(),
        chrono::Utc::now(),
    )
    .with_context(|| {
        format!(
            "failed to prepare recommender from {}",
            config.data_dir().display()
        )
    })?;

    let model_path = config.model_path();
    artifact::save_to_path(&snapshot, &model_path, config.encode_options())
        .with_context(|| format!("failed to save artifact to {}", model_path.display()))?;
    drop(snapshot);

    let handle = SnapshotHandle::new();
    handle
        .reload_from(&LocalFileSource::new(&model_path))
        .with_context(|| format!("failed to reload artifact from {}", model_path.display()))?;

    let served = handle.recommend_popular(config.default_n().get());
    if served.mode != ServingMode::Live {
        anyhow::bail!("snapshot handle is not live after reload");
    }
    let rendered =
        serde_json::to_string(&served).context("failed to render popular recommendations")?;
    info!(
        model_path = %model_path.display(),
        popular = %rendered,
        "recommender artifact ready"
    );

    Ok(())
}
