use tracing::{info, level_filters::LevelFilter, subscriber};
use tracing_subscriber::FmtSubscriber;

pub fn init_tracing(level: LevelFilter) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    subscriber::set_global_default(subscriber)?;
    info!("Initialized tracing with level: {}", level);

    Ok(())
}
