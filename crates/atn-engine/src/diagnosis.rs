//! Mapping from an ATN profile to a diagnosis.
//!
//! The label depends only on the A/T/N triple. Severity comes from the cognitive context and
//! is reported next to the label, never folded into it.

use crate::axis::{AtnTriple, AxisStatus};
use crate::classify::{AtnProfile, AxisConflict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorical diagnosis derived from the A/T/N triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosisLabel {
    #[serde(rename = "Alzheimer's Disease continuum")]
    AlzheimersContinuum,
    #[serde(rename = "Alzheimer's disease without evident neurodegeneration")]
    AlzheimersWithoutNeurodegeneration,
    #[serde(rename = "Alzheimer's pathology with suspected non-Alzheimer's co-pathology")]
    AlzheimersWithCoPathology,
    #[serde(rename = "Preclinical Alzheimer's pathology")]
    PreclinicalAlzheimers,
    #[serde(rename = "Suspected non-Alzheimer's pathologic change")]
    SuspectedNonAlzheimers,
    #[serde(rename = "Non-AD neurodegeneration")]
    NonAlzheimersNeurodegeneration,
    #[serde(rename = "No biomarker evidence of neurodegenerative disease")]
    NoBiomarkerEvidence,
    #[serde(rename = "Indeterminate — additional testing recommended")]
    IndeterminateWithPositive,
    #[serde(rename = "Further workup required")]
    FurtherWorkupRequired,
}

impl DiagnosisLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosisLabel::AlzheimersContinuum => "Alzheimer's Disease continuum",
            DiagnosisLabel::AlzheimersWithoutNeurodegeneration => {
                "Alzheimer's disease without evident neurodegeneration"
            }
            DiagnosisLabel::AlzheimersWithCoPathology => {
                "Alzheimer's pathology with suspected non-Alzheimer's co-pathology"
            }
            DiagnosisLabel::PreclinicalAlzheimers => "Preclinical Alzheimer's pathology",
            DiagnosisLabel::SuspectedNonAlzheimers => "Suspected non-Alzheimer's pathologic change",
            DiagnosisLabel::NonAlzheimersNeurodegeneration => "Non-AD neurodegeneration",
            DiagnosisLabel::NoBiomarkerEvidence => {
                "No biomarker evidence of neurodegenerative disease"
            }
            DiagnosisLabel::IndeterminateWithPositive => {
                "Indeterminate — additional testing recommended"
            }
            DiagnosisLabel::FurtherWorkupRequired => "Further workup required",
        }
    }

    /// Label for a triple. Total over all 27 status combinations.
    pub fn for_triple(triple: AtnTriple) -> Self {
        use AxisStatus::{Indeterminate as I, Negative as N, Positive as P};

        match (triple.amyloid, triple.tau, triple.neurodegeneration) {
            (P, P, P) => DiagnosisLabel::AlzheimersContinuum,
            (P, P, N) => DiagnosisLabel::AlzheimersWithoutNeurodegeneration,
            (P, N, P) => DiagnosisLabel::AlzheimersWithCoPathology,
            (P, N, N) => DiagnosisLabel::PreclinicalAlzheimers,
            (N, P, P) | (N, P, N) => DiagnosisLabel::SuspectedNonAlzheimers,
            (N, N, P) => DiagnosisLabel::NonAlzheimersNeurodegeneration,
            (N, N, N) => DiagnosisLabel::NoBiomarkerEvidence,

            (I, P, P) | (I, P, N) | (I, P, I) | (I, N, P) | (I, I, P)
            | (P, I, P) | (P, I, N) | (P, I, I) | (N, I, P)
            | (P, P, I) | (P, N, I) | (N, P, I) => DiagnosisLabel::IndeterminateWithPositive,

            (I, I, I) | (I, I, N) | (I, N, I) | (I, N, N)
            | (N, I, I) | (N, I, N) | (N, N, I) => DiagnosisLabel::FurtherWorkupRequired,
        }
    }

    fn recommendations(self) -> &'static [&'static str] {
        match self {
            DiagnosisLabel::AlzheimersContinuum => &[
                "Neurologist referral",
                "Pharmacological treatment discussion",
                "Caregiver support and education",
            ],
            DiagnosisLabel::AlzheimersWithoutNeurodegeneration => &[
                "Neurologist referral",
                "Pharmacological treatment discussion",
                "Brain MRI with hippocampal volumetry",
            ],
            DiagnosisLabel::AlzheimersWithCoPathology => &[
                "Neurologist referral",
                "Evaluate vascular and other non-Alzheimer's contributors",
                "Caregiver support and education",
            ],
            DiagnosisLabel::PreclinicalAlzheimers => &[
                "Annual cognitive assessment",
                "Healthy lifestyle maintenance",
            ],
            DiagnosisLabel::SuspectedNonAlzheimers => &[
                "Neurologist referral",
                "Evaluate non-Alzheimer's tauopathies",
            ],
            DiagnosisLabel::NonAlzheimersNeurodegeneration => &[
                "Neurologist referral",
                "Evaluate vascular and other non-Alzheimer's causes of neurodegeneration",
            ],
            DiagnosisLabel::NoBiomarkerEvidence => &[
                "Regular cognitive assessment",
                "Healthy lifestyle maintenance",
                "Social activities",
            ],
            DiagnosisLabel::IndeterminateWithPositive => &[
                "Neurologist referral",
                "Complete biomarker testing for indeterminate axes",
            ],
            DiagnosisLabel::FurtherWorkupRequired => &[
                "Complete biomarker workup",
                "Basic metabolic panel",
                "Thyroid function tests",
                "Vitamin B12 and folate levels",
            ],
        }
    }
}

impl fmt::Display for DiagnosisLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cognitive impairment tier derived from MMSE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl SeverityTier {
    fn recommendations(self) -> &'static [&'static str] {
        match self {
            SeverityTier::Normal => &["Regular cognitive assessment"],
            SeverityTier::Mild => &[
                "Cognitive training exercises",
                "Regular physical activity",
                "Social engagement activities",
            ],
            SeverityTier::Moderate => &[
                "Cognitive rehabilitation therapy",
                "Behavioral management strategies",
                "Structured routines",
            ],
            SeverityTier::Severe => &[
                "Advanced care planning",
                "Safety assessment for home environment",
                "Palliative care consultation",
            ],
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeverityTier::Normal => "Normal",
            SeverityTier::Mild => "Mild",
            SeverityTier::Moderate => "Moderate",
            SeverityTier::Severe => "Severe",
        };
        f.write_str(name)
    }
}

/// Minimum MTA score that escalates a mild, triple-positive patient to moderate.
pub const MTA_ESCALATION_SCORE: f64 = 2.0;

/// MMSE at or below this score screens positive for cognitive impairment.
pub const MMSE_IMPAIRMENT_MAX: f64 = 23.0;

/// MoCA at or below this score screens positive for cognitive impairment.
pub const MOCA_IMPAIRMENT_MAX: f64 = 25.0;

/// Cognitive scores and intake findings captured alongside the biomarkers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CognitiveContext {
    pub mmse_score: Option<f64>,
    pub moca_score: Option<f64>,
    pub faq_score: Option<f64>,
    pub ad8_score: Option<f64>,
    /// Medial temporal atrophy visual rating.
    pub mta_score: Option<f64>,
    pub family_history: Option<bool>,
    pub is_independent: Option<bool>,
    pub behavior_change: Option<bool>,
}

impl CognitiveContext {
    /// MMSE or MoCA at or below its impairment cutoff. Absent or non-finite scores never count.
    pub fn cognitive_impairment(&self) -> bool {
        let at_most = |score: Option<f64>, max: f64| score.is_some_and(|v| v.is_finite() && v <= max);
        at_most(self.mmse_score, MMSE_IMPAIRMENT_MAX) || at_most(self.moca_score, MOCA_IMPAIRMENT_MAX)
    }

    /// Risk factors present in the intake findings, in [`RiskFactor::ALL`] order.
    pub fn risk_factors(&self) -> Vec<RiskFactor> {
        RiskFactor::ALL
            .into_iter()
            .filter(|factor| match factor {
                RiskFactor::FamilyHistory => self.family_history == Some(true),
                RiskFactor::FunctionalDependence => self.is_independent == Some(false),
                RiskFactor::BehaviorChange => self.behavior_change == Some(true),
            })
            .collect()
    }
}

/// Intake finding that raises the patient's risk profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    FamilyHistory,
    FunctionalDependence,
    BehaviorChange,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 3] = [
        RiskFactor::FamilyHistory,
        RiskFactor::FunctionalDependence,
        RiskFactor::BehaviorChange,
    ];

    pub fn description(self) -> &'static str {
        match self {
            RiskFactor::FamilyHistory => "Family history of neurodegenerative disease",
            RiskFactor::FunctionalDependence => "Dependent in daily activities",
            RiskFactor::BehaviorChange => "Recent behavioural or personality change",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Bands an MMSE score: 25–30 normal, 21–24 mild, 10–20 moderate, 0–9 severe.
pub fn severity_from_mmse(mmse: Option<f64>) -> Option<SeverityTier> {
    let mmse = mmse.filter(|v| v.is_finite())?;
    let tier = if mmse >= 25.0 {
        SeverityTier::Normal
    } else if mmse >= 21.0 {
        SeverityTier::Mild
    } else if mmse >= 10.0 {
        SeverityTier::Moderate
    } else {
        SeverityTier::Severe
    };
    Some(tier)
}

/// Everything derived for a patient once the biomarker stage is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub label: DiagnosisLabel,
    pub severity: Option<SeverityTier>,
    /// MMSE or MoCA screen at or below its cutoff.
    pub cognitive_impairment: bool,
    pub risk: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub atn: AtnTriple,
    pub conflicts: Vec<AxisConflict>,
    pub profile: AtnProfile,
    pub cognitive: CognitiveContext,
}

/// Maps a classified profile and cognitive context to a [`DiagnosisResult`].
pub fn map_to_diagnosis(profile: &AtnProfile, cognitive: &CognitiveContext) -> DiagnosisResult {
    let atn = profile.triple();
    let label = DiagnosisLabel::for_triple(atn);

    let mut severity = severity_from_mmse(cognitive.mmse_score);
    let atrophic = cognitive
        .mta_score
        .is_some_and(|mta| mta >= MTA_ESCALATION_SCORE);
    if atn.all_positive() && severity == Some(SeverityTier::Mild) && atrophic {
        tracing::debug!(%atn, "mild severity escalated to moderate on MTA score");
        severity = Some(SeverityTier::Moderate);
    }

    let conflicts = profile.conflicts();
    let cognitive_impairment = cognitive.cognitive_impairment();
    let risk = cognitive.risk_factors();

    let mut recommendations: Vec<String> = Vec::new();
    let mut push = |item: String| {
        if !recommendations.contains(&item) {
            recommendations.push(item);
        }
    };
    label
        .recommendations()
        .iter()
        .for_each(|r| push((*r).to_owned()));
    if let Some(tier) = severity {
        tier.recommendations()
            .iter()
            .for_each(|r| push((*r).to_owned()));
    }
    for conflict in &conflicts {
        push(format!(
            "Repeat {} testing on a single platform",
            conflict.axis
        ));
    }

    tracing::info!(
        %atn,
        %label,
        ?severity,
        cognitive_impairment,
        risk = risk.len(),
        conflicts = conflicts.len(),
        "diagnosis mapped"
    );

    DiagnosisResult {
        label,
        severity,
        cognitive_impairment,
        risk,
        recommendations,
        atn,
        conflicts,
        profile: profile.clone(),
        cognitive: cognitive.clone(),
    }
}
