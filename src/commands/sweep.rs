use anyhow::Result;
use imgharvest::{
    config::Config,
    sweep::{run_periodic, sweep_once},
};
use tokio::sync::broadcast;

/// One sweep pass, or periodic passes until Ctrl-C with `watch`
pub async fn sweep(config: Config, watch: bool) -> Result<()> {
    let base = config.download.base_path.clone();
    let report = if watch {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = tokio::spawn(run_periodic(base.clone(), config.sweep.interval(), shutdown_rx));
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        handle.await?
    } else {
        sweep_once(base.clone()).await
    };

    println!(
        "Swept {}: {} partitions, {} files scanned, {} duplicates removed",
        base.display(),
        report.partitions,
        report.files_scanned,
        report.files_removed
    );
    Ok(())
}
