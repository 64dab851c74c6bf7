use std::{fs, path::Path, sync::Arc};

use burn_ndarray::{NdArrayBackend, NdArrayDevice};
use cxr_core::{
    data::{
        CheXpertDataModule, DataLoader, DataModule, PneumoniaBatch, PneumoniaDataModule, PneumothoraxDataModule,
        PretrainingDataModule,
    },
    DataModuleError, DatasetError, ExperimentConfig, LoaderError, Phase, TrainConfig,
};
use cxr_data::{DataConfig, ImageConfig, Split, TextConfig};
use cxr_transforms::{CropConfig, TransformConfig, TransformError};
use image::{GrayImage, Luma};
use tempfile::TempDir;

type TestBackend = NdArrayBackend<f32>;

const ROWS: usize = 5;
const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\nno\nacute\neffusion\n";

/// One manifest carrying the columns of every dataset, used for all three
/// splits. Images are 8 wide and 4 tall; odd rows are pneumonia positive
/// with a single box.
fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from(
        "Path,Frontal/Lateral,Atelectasis,Cardiomegaly,Consolidation,Edema,Pleural Effusion,\
         Label,Target,x,y,width,height,Report Impression\n",
    );
    for i in 0..ROWS {
        let name = format!("img{}.png", i);
        GrayImage::from_pixel(8, 4, Luma([200])).save(dir.path().join(&name)).unwrap();
        let (target, bbox) = if i % 2 == 1 { (1, "1,1,2,1") } else { (0, ",,,") };
        csv.push_str(&format!(
            "{},Frontal,1,0,-1,,1,{},{},{},no acute effusion\n",
            name, target, target, bbox
        ));
    }
    for split in Split::ALL {
        fs::write(dir.path().join(format!("{}.csv", split)), &csv).unwrap();
    }
    fs::write(dir.path().join("vocab.txt"), VOCAB).unwrap();
    dir
}

fn data_config(root: &Path) -> DataConfig {
    DataConfig {
        root: root.to_path_buf(),
        train_csv: root.join("train.csv"),
        valid_csv: root.join("valid.csv"),
        test_csv: root.join("test.csv"),
        image: ImageConfig {
            imsize: 8,
            frontal_only: true,
        },
        text: TextConfig {
            word_num: 6,
            vocab_path: root.join("vocab.txt"),
            ..TextConfig::default()
        },
        ..DataConfig::default()
    }
}

fn config(root: &Path, phase: Phase, num_workers: usize) -> Arc<ExperimentConfig> {
    let transforms = TransformConfig {
        random_crop: Some(CropConfig { crop_size: 6 }),
        norm: Some("half".to_string()),
        ..TransformConfig::default()
    };
    Arc::new(
        ExperimentConfig::new(phase, TrainConfig::new().with_batch_size(2).with_num_workers(num_workers))
            .with_data(data_config(root))
            .with_transforms(transforms),
    )
}

fn assert_policy<I, O>(loader: &DataLoader<I, O>, split: Split) {
    let (drop_last, shuffle, batches) = match split {
        Split::Train => (true, true, 2),
        Split::Valid => (true, false, 2),
        Split::Test => (false, false, 3),
    };
    assert_eq!(loader.drop_last(), drop_last, "{} drop_last", split);
    assert_eq!(loader.is_shuffled(), shuffle, "{} shuffle", split);
    assert!(loader.pin_memory(), "{} pin_memory", split);
    assert_eq!(loader.batch_size(), 2);
    assert_eq!(loader.num_workers(), 1);
    assert_eq!(loader.num_items(), ROWS);
    assert_eq!(loader.num_batches(), batches, "{} batches", split);
}

fn assert_module_policy<M: DataModule>(module: &M) {
    assert_policy(&module.train_dataloader().unwrap(), Split::Train);
    assert_policy(&module.val_dataloader().unwrap(), Split::Valid);
    assert_policy(&module.test_dataloader().unwrap(), Split::Test);
}

#[test]
fn every_module_follows_the_split_policy() {
    let dir = fixture();
    let cfg = config(dir.path(), Phase::Classification, 1);

    assert_module_policy(&CheXpertDataModule::<TestBackend>::new(Arc::clone(&cfg), NdArrayDevice::Cpu));
    assert_module_policy(&PneumothoraxDataModule::<TestBackend>::new(Arc::clone(&cfg), NdArrayDevice::Cpu));
    assert_module_policy(&PneumoniaDataModule::<TestBackend>::new(Arc::clone(&cfg), NdArrayDevice::Cpu));
    assert_module_policy(&PretrainingDataModule::<TestBackend>::new(cfg, NdArrayDevice::Cpu));
}

#[test]
fn chexpert_batches_carry_mapped_labels() {
    let dir = fixture();
    let module = CheXpertDataModule::<TestBackend>::new(config(dir.path(), Phase::Classification, 0), NdArrayDevice::Cpu);
    let loader = module.test_dataloader().unwrap();

    let batches: Vec<_> = loader.iter(0).map(|b| b.unwrap()).collect();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].images.shape().dims, [2, 3, 6, 6]);
    assert_eq!(batches[2].images.shape().dims, [1, 3, 6, 6]);
    assert_eq!(batches[0].paths, vec!["img0.png", "img1.png"]);
    assert_eq!(
        batches[0].labels.clone().into_data().value,
        vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    );
}

#[test]
fn worker_threads_keep_batch_order() {
    let dir = fixture();
    let paths = |workers: usize| -> Vec<String> {
        let module = PneumothoraxDataModule::<TestBackend>::new(
            config(dir.path(), Phase::Classification, workers),
            NdArrayDevice::Cpu,
        );
        let loader = module.train_dataloader().unwrap();
        loader.iter(3).flat_map(|b| b.unwrap().paths).collect()
    };
    assert_eq!(paths(0), paths(2));
}

#[test]
fn pneumonia_collate_follows_phase() {
    let dir = fixture();

    let module = PneumoniaDataModule::<TestBackend>::new(config(dir.path(), Phase::Classification, 0), NdArrayDevice::Cpu);
    let batch = module.test_dataloader().unwrap().iter(0).next().unwrap().unwrap();
    match batch {
        PneumoniaBatch::Classification(batch) => {
            assert_eq!(batch.labels.into_data().value, vec![0.0, 1.0]);
        }
        PneumoniaBatch::Detection(_) => panic!("classification phase produced detection batch"),
    }

    let cfg = ExperimentConfig::new(Phase::Detection, TrainConfig::new().with_batch_size(2).with_num_workers(0))
        .with_data(data_config(dir.path()));
    let module = PneumoniaDataModule::<TestBackend>::new(Arc::new(cfg), NdArrayDevice::Cpu);
    let batch = module.test_dataloader().unwrap().iter(0).next().unwrap().unwrap();
    match batch {
        PneumoniaBatch::Detection(batch) => {
            assert_eq!(batch.images.shape().dims, [2, 3, 8, 8]);
            assert!(batch.targets[0].boxes.is_empty());
            // 8x4 image letterboxed into 8x8: two rows of padding on top
            assert_eq!(batch.targets[1].boxes, vec![[1.0, 3.0, 3.0, 4.0]]);
            assert_eq!(batch.targets[1].labels, vec![1]);
        }
        PneumoniaBatch::Classification(_) => panic!("detection phase produced classification batch"),
    }
}

#[test]
fn detection_boxes_follow_the_center_crop() {
    let dir = fixture();
    let module = PneumoniaDataModule::<TestBackend>::new(config(dir.path(), Phase::Detection, 0), NdArrayDevice::Cpu);

    for loader in [module.val_dataloader().unwrap(), module.test_dataloader().unwrap()] {
        match loader.iter(0).next().unwrap().unwrap() {
            PneumoniaBatch::Detection(batch) => {
                assert_eq!(batch.images.shape().dims, [2, 3, 6, 6]);
                // the 8x8 canvas is cropped to 6x6 starting at (1, 1)
                assert_eq!(batch.targets[1].boxes, vec![[0.0, 2.0, 2.0, 3.0]]);
            }
            PneumoniaBatch::Classification(_) => panic!("detection phase produced classification batch"),
        }
    }
}

#[test]
fn pretraining_batches_hold_tokenized_captions() {
    let dir = fixture();
    let module = PretrainingDataModule::<TestBackend>::new(config(dir.path(), Phase::Pretrain, 0), NdArrayDevice::Cpu);

    let batch = module.val_dataloader().unwrap().iter(0).next().unwrap().unwrap();
    assert_eq!(batch.imgs.shape().dims, [2, 3, 6, 6]);
    assert_eq!(batch.caption_ids.shape().dims, [2, 6]);
    assert_eq!(batch.cap_lens, vec![5, 5]);
    assert_eq!(batch.caption_ids.into_data().value[..6], [2, 4, 5, 6, 3, 0]);
}

#[test]
fn train_fraction_only_shrinks_the_train_split() {
    let dir = fixture();
    let mut data = data_config(dir.path());
    data.frac = 0.4;
    let cfg = ExperimentConfig::new(Phase::Classification, TrainConfig::new().with_batch_size(2).with_num_workers(0))
        .with_data(data);
    let module = CheXpertDataModule::<TestBackend>::new(Arc::new(cfg), NdArrayDevice::Cpu);

    assert_eq!(module.train_dataloader().unwrap().num_items(), 2);
    assert_eq!(module.val_dataloader().unwrap().num_items(), ROWS);
}

#[test]
fn construction_errors_reach_the_caller() {
    let dir = fixture();

    let mut data = data_config(dir.path());
    data.valid_csv = dir.path().join("absent.csv");
    let cfg = ExperimentConfig::new(Phase::Classification, TrainConfig::new()).with_data(data);
    let module = CheXpertDataModule::<TestBackend>::new(Arc::new(cfg), NdArrayDevice::Cpu);
    assert!(module.train_dataloader().is_ok());
    assert!(matches!(
        module.val_dataloader(),
        Err(DataModuleError::Dataset(DatasetError::Data(_)))
    ));

    let cfg = ExperimentConfig::new(Phase::Classification, TrainConfig::new())
        .with_data(data_config(dir.path()))
        .with_transforms(TransformConfig {
            norm: Some("zscore".to_string()),
            ..TransformConfig::default()
        });
    let module = PneumothoraxDataModule::<TestBackend>::new(Arc::new(cfg), NdArrayDevice::Cpu);
    assert!(matches!(
        module.test_dataloader(),
        Err(DataModuleError::Transform(TransformError::UnknownNorm(_)))
    ));
}

#[test]
fn unreadable_images_fail_their_batch() {
    let dir = fixture();
    fs::remove_file(dir.path().join("img3.png")).unwrap();
    let module = PneumothoraxDataModule::<TestBackend>::new(config(dir.path(), Phase::Classification, 0), NdArrayDevice::Cpu);

    let results: Vec<_> = module.test_dataloader().unwrap().iter(0).collect();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(LoaderError::Dataset(DatasetError::Transform(TransformError::Image { .. })))
    ));
    assert!(results[2].is_ok());
}
