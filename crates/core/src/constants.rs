//! Constants used throughout the ATN core crate.

/// Default upper bound on a single backend call, in milliseconds.
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 30_000;

/// Environment variable overriding [`DEFAULT_BACKEND_TIMEOUT_MS`].
pub const BACKEND_TIMEOUT_ENV: &str = "ATN_BACKEND_TIMEOUT_MS";

/// Environment variable naming a YAML threshold table to load instead of the built-in rows.
pub const THRESHOLDS_FILE_ENV: &str = "ATN_THRESHOLDS_FILE";

/// Default time an open backend session may sit untouched before it is evicted, in seconds.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 3_600;

/// Environment variable overriding [`DEFAULT_SESSION_IDLE_SECS`].
pub const SESSION_IDLE_ENV: &str = "ATN_SESSION_IDLE_SECS";

// Stage 1 field names.
pub const FIELD_AGE: &str = "age";
pub const FIELD_MMSE: &str = "mmse_score";
pub const FIELD_MOCA: &str = "moca_score";
pub const FIELD_BEHAVIOR_CHANGE: &str = "behavior_change";
pub const FIELD_IS_INDEPENDENT: &str = "is_independent";
pub const FIELD_FAMILY_HISTORY: &str = "family_history";
pub const FIELD_CLINICAL_NOTES: &str = "clinical_notes";

// Stage 2 field names.
pub const FIELD_ASSAY_METHODS: &str = "assay_methods";
pub const FIELD_FAQ: &str = "faq_score";
pub const FIELD_AD8: &str = "ad8_score";
pub const FIELD_MTA: &str = "mta_score";
pub const FIELD_ABETA42_40_RATIO: &str = "abeta42_40_ratio";
pub const FIELD_ABETA42: &str = "abeta42";
pub const FIELD_PTAU_ABETA42_RATIO: &str = "ptau_abeta42_ratio";
pub const FIELD_PTAU181: &str = "ptau181";
pub const FIELD_T_TAU: &str = "t_tau";
pub const FIELD_PLASMA_ABETA42_40_RATIO: &str = "plasma_abeta42_40_ratio";
pub const FIELD_PLASMA_PTAU181: &str = "plasma_ptau181";
pub const FIELD_HIPPOCAMPAL_LEFT: &str = "hippocampal_left";
pub const FIELD_HIPPOCAMPAL_RIGHT: &str = "hippocampal_right";
pub const FIELD_INTRACRANIAL_VOLUME: &str = "intracranial_volume";

// Stage 3 field names.
pub const FIELD_CLINICIAN_NOTES: &str = "clinician_notes";

// Stage 4 field names.
pub const FIELD_MEDICATION_PLAN: &str = "medication_plan";
pub const FIELD_THERAPY_PLAN: &str = "therapy_plan";
pub const FIELD_FOLLOW_UP_MONTHS: &str = "follow_up_months";
pub const FIELD_PLAN_NOTES: &str = "plan_notes";

/// Assay method names accepted in the `assay_methods` field.
pub const ASSAY_METHOD_NAMES: &[&str] = &[
    "Elecsys",
    "Innotest",
    "Lumipulse",
    "MRIFreesurfer",
    "PlasmaSimoa",
];
