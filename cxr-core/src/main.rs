use std::{env, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use burn_ndarray::{NdArrayBackend, NdArrayDevice};
use cxr_core::{
    data::{
        CheXpertDataModule, DataLoader, DataModule, ImaGenomePretrainingDataModule, PneumoniaDataModule,
        PneumothoraxDataModule, PretrainingDataModule,
    },
    ExperimentConfig,
};
use log::info;
use logging_timer::timer;

type Backend = NdArrayBackend<f32>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cxr-core <config.json>")?;
    let cfg = Arc::new(
        ExperimentConfig::load(&path).with_context(|| format!("could not load config {}", path.display()))?,
    );
    let device = NdArrayDevice::Cpu;

    match cfg.data.dataset.as_str() {
        "pretrain" => run(PretrainingDataModule::<Backend>::new(Arc::clone(&cfg), device)),
        "imagenome" => run(
            ImaGenomePretrainingDataModule::<Backend>::new(Arc::clone(&cfg), device)
                .context("could not build the ImaGenome data module")?,
        ),
        "chexpert" => run(CheXpertDataModule::<Backend>::new(Arc::clone(&cfg), device)),
        "pneumothorax" => run(PneumothoraxDataModule::<Backend>::new(Arc::clone(&cfg), device)),
        "pneumonia" => run(PneumoniaDataModule::<Backend>::new(Arc::clone(&cfg), device)),
        other => bail!("unknown dataset {}", other),
    }
}

/// Prepares the module and walks one epoch of every loader.
fn run<M>(mut module: M) -> Result<()>
where
    M: DataModule,
    M::Item: Send + 'static,
    M::Batch: Send + 'static,
{
    module.prepare_data().context("prepare_data failed")?;

    drain("train", module.train_dataloader().context("could not build the train loader")?)?;
    drain("valid", module.val_dataloader().context("could not build the valid loader")?)?;
    drain("test", module.test_dataloader().context("could not build the test loader")?)?;
    Ok(())
}

fn drain<I: Send + 'static, O: Send + 'static>(name: &str, loader: DataLoader<I, O>) -> Result<()> {
    let _tmr = timer!("EPOCH", "{} loader", name);
    info!(
        "{}: {} items in {} batches (batch size {}, {} workers, shuffle {}, drop_last {}, pin_memory {})",
        name,
        loader.num_items(),
        loader.num_batches(),
        loader.batch_size(),
        loader.num_workers(),
        loader.is_shuffled(),
        loader.drop_last(),
        loader.pin_memory()
    );

    let mut batches = 0;
    for batch in loader.iter(0) {
        batch.with_context(|| format!("{} batch {} failed", name, batches))?;
        batches += 1;
    }
    info!("{}: {} batches loaded", name, batches);
    Ok(())
}
