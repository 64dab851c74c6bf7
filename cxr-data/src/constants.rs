// CheXpert
pub const CHEXPERT_PATH_COL: &str = "Path";
pub const CHEXPERT_VIEW_COL: &str = "Frontal/Lateral";
pub const CHEXPERT_FRONTAL: &str = "Frontal";
pub const CHEXPERT_COMPETITION_TASKS: [&str; 5] = [
    "Atelectasis",
    "Cardiomegaly",
    "Consolidation",
    "Edema",
    "Pleural Effusion",
];
/// Replacement for the uncertain label (-1), indexed like `CHEXPERT_COMPETITION_TASKS`.
pub const CHEXPERT_UNCERTAIN_MAPPINGS: [f32; 5] = [1.0, 0.0, 0.0, 1.0, 1.0];

// SIIM pneumothorax
pub const PNEUMOTHORAX_PATH_COL: &str = "Path";
pub const PNEUMOTHORAX_LABEL_COL: &str = "Label";

// RSNA pneumonia
pub const PNEUMONIA_PATH_COL: &str = "Path";
pub const PNEUMONIA_TARGET_COL: &str = "Target";
pub const PNEUMONIA_BOX_COLS: [&str; 4] = ["x", "y", "width", "height"];

// Multimodal pretraining
pub const PRETRAINING_PATH_COL: &str = "Path";

// ImaGenome splits
pub const IMAGENOME_DICOM_COL: &str = "dicom_id";
pub const IMAGENOME_SUBJECT_COL: &str = "subject_id";
pub const IMAGENOME_STUDY_COL: &str = "study_id";
