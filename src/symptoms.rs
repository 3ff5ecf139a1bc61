//! Symptom term vocabularies and classification.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet};

use crate::ArcStr;

/// Any of these symptom terms count as a death.
pub static DEATH_SYMPTOMS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "agonal death struggle",
        "brain death",
        "cardiac death",
        "death",
        "death neonatal",
        "foetal death",
        "intra-uterine death",
        "sudden cardiac death",
        "sudden death",
        "sudden infant death syndrome",
    ])
});

/// Sentinel term added to a single-symptom record matching a keyword filter, so such
/// records are distinguishable from multi-symptom co-occurrences in frequency output.
pub const NO_OTHER_SYMPTOMS: &str = "no other symptoms";

/// Human-readable expansions for MedDRA jargon, used only when labelling output.
static SYMPTOM_EXPANSIONS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("ageusia", "ageusia (loss of taste)"),
        ("amnesia", "amnesia (loss of memories)"),
        ("angioedema", "angioedema (swelling under the skin)"),
        ("angiogram", "angiogram (heart x-ray)"),
        ("anosmia", "anosmia (loss of smell)"),
        ("aphasia", "aphasia (difficulty with speech or language)"),
        ("apnoea", "apnoea (breathing stops while you sleep)"),
        ("arthralgia", "arthralgia (joint pain)"),
        ("asthenia", "asthenia (lack of energy)"),
        ("atrial fibrillation", "atrial fibrillation (irregular heart rate)"),
        ("cellulitis", "cellulitis (skin infection)"),
        ("computerised tomogram", "computerised tomogram (CT imaging/\"CAT scan\")"),
        ("contusion", "contusion (bruise)"),
        ("cyanosis", "cyanosis (blue tint of the skin)"),
        ("deep vein thrombosis", "deep vein thrombosis (blood clot)"),
        ("dermatitis bullous", "dermatitis bullous (blisters)"),
        ("diplopia", "diplopia (double vision)"),
        ("dysarthria", "dysarthria (slurring words)"),
        ("dysgeusia", "dysgeusia (altered perception of taste)"),
        ("dyskinesia", "dyskinesia (involuntary twitching)"),
        ("dyspepsia", "dyspepsia (indigestion)"),
        ("dysphagia", "dysphagia (difficulty swallowing)"),
        ("dysphonia", "dysphonia (abnormal voice)"),
        ("dysstasia", "dysstasia (difficulty standing)"),
        ("epistaxis", "epistaxis (nosebleed)"),
        ("erythema", "erythema (redness)"),
        ("eye pruritus", "eye pruritus (itchy eye)"),
        ("face oedema", "face oedema (swelling)"),
        ("hemiparesis", "hemiparesis (can't move one side of the body)"),
        ("herpes zoster", "herpes zoster (cold sore)"),
        ("hyperhidrosis", "hyperhidrosis (excessive sweating)"),
        ("hypersomnia", "hypersomnia (daytime sleepiness)"),
        ("hypertension", "hypertension (high blood pressure)"),
        ("hypoacusis", "hypoacusis (numbness)"),
        ("hypoaesthesia", "hypoaesthesia (numbness)"),
        ("hypoaesthesia oral", "hypoaesthesia oral (mouth numbness)"),
        ("hypokinesia", "hypokinesia (limited range of movement)"),
        ("hypotension", "hypotension (low blood pressure)"),
        ("hypotonia", "hypotonia (decreased muscle tone)"),
        ("hypoxia", "hypoxia (low oxygen)"),
        ("induration", "induration (inflamed stiffness)"),
        ("injection site cellulitis", "injection site cellulitis (skin infection)"),
        ("injection site erythema", "injection site erythema (redness)"),
        ("injection site oedema", "injection site oedema (swelling)"),
        ("injection site pruritus", "injection site pruritus (itch)"),
        ("injection site urticaria", "injection site urticaria (hives)"),
        ("insomnia", "insomnia (can't sleep)"),
        ("lacrimation increased", "lacrimation increased (watering eyes)"),
        ("lethargy", "lethargy (lack of energy)"),
        ("lymphadenopathy", "lymphadenopathy (swollen lymph nodes)"),
        ("malaise", "malaise (general discomfort)"),
        ("myalgia", "myalgia (muscle pain)"),
        ("myocardial infarction", "myocardial infarction (heart attack)"),
        ("nasopharyngitis", "nasopharyngitis (common cold)"),
        ("neuralgia", "neuralgia (sharp pain)"),
        ("ocular hyperemia", "ocular hyperemia (red eyes)"),
        ("oedema", "oedema (swelling)"),
        ("oedema peripheral", "oedema peripheral (swelling)"),
        ("oropharyngeal pain", "oropharyngeal pain (sore throat)"),
        ("pallor", "pallor (pale appearance)"),
        ("paraesthesia", "paraesthesia (pins and needles)"),
        ("paraesthesia oral", "paraesthesia oral (pins and needles)"),
        ("parosmia", "parosmia (distorted sense of smell)"),
        ("petechiae", "petechiae (pinpoint spots)"),
        ("pharyngeal paraesthesia", "pharyngeal paraesthesia (false obstruction)"),
        ("pharyngitis", "pharyngitis (sore throat)"),
        ("photophobia", "photophobia (light sensitivity)"),
        ("presyncope", "presyncope (going to faint)"),
        ("pruritus", "pruritus (itch)"),
        ("pulmonary embolism", "pulmonary embolism (arterial blockage, lung)"),
        ("pyrexia", "pyrexia (fever)"),
        ("rash erythematous", "rash erythematous (inflamed capillaries)"),
        ("rash macular", "rash macular (small red spots)"),
        ("rash maculo-papular", "rash maculo-papular (small raised red bumps)"),
        ("rash papular", "rash papular (bumpy rash)"),
        ("rash pruritic", "rash pruritic (itchy rash)"),
        ("rash vesicular", "rash vesicular (small blisters)"),
        ("rhinitis", "rhinitis (cold, allergies)"),
        ("rhinorrhoea", "rhinorrhoea (runny nose)"),
        ("somnolence", "somnolence (feeling sleepy)"),
        ("syncope", "syncope (fainting)"),
        ("tachycardia", "tachycardia (fast heartbeat)"),
        ("thrombosis", "thrombosis (blood clot in vein or artery)"),
        ("tinnitus", "tinnitus (ringing in the ears)"),
        ("troponin", "troponin (type of protein found in heart muscle)"),
        ("urticaria", "urticaria (hives, rash)"),
        ("vasodilatation", "vasodilatation (hot flushed skin)"),
    ])
});

/// The display label for a symptom term. Terms outside the expansion table are shown
/// in their raw form.
pub fn expand(term: &str) -> &str {
    SYMPTOM_EXPANSIONS.get(term).copied().unwrap_or(term)
}

/// Classifies a report's symptom set against the death vocabulary.
///
/// Keeps an audit tally of terms that mention "death" without being in the curated
/// vocabulary; these never affect classification but are reported to the operator at
/// the end of the run for manual review.
#[derive(Debug, Default)]
pub struct DeathClassifier {
    unmatched: BTreeMap<ArcStr, u64>,
}

impl DeathClassifier {
    /// Does this symptom set count as a death?
    ///
    /// On a non-match, each distinct term containing the substring "death" is tallied
    /// once for this record.
    pub fn is_death(&mut self, symptoms: &BTreeSet<ArcStr>) -> bool {
        let matched = symptoms
            .iter()
            .any(|term| DEATH_SYMPTOMS.contains(&**term));
        if !matched {
            for term in symptoms.iter().filter(|term| term.contains("death")) {
                *self.unmatched.entry(term.clone()).or_insert(0) += 1;
            }
        }
        matched
    }

    pub fn has_unmatched(&self) -> bool {
        !self.unmatched.is_empty()
    }

    /// Unmatched deathlike terms, most frequent first. Ties keep term order.
    pub fn ranked_unmatched(&self) -> Vec<(&ArcStr, u64)> {
        let mut out: Vec<_> = self.unmatched.iter().map(|(term, n)| (term, *n)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}

/// A user-supplied keyword filter for the symptom frequency mode.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: BTreeSet<ArcStr>,
}

impl KeywordFilter {
    pub fn new(keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        KeywordFilter {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase().into())
                .collect(),
        }
    }

    /// The terms to count for a record, or `None` when the record does not match.
    ///
    /// A single-symptom match gets the [`NO_OTHER_SYMPTOMS`] sentinel added.
    pub fn apply(&self, symptoms: &BTreeSet<ArcStr>) -> Option<BTreeSet<ArcStr>> {
        if symptoms.is_disjoint(&self.keywords) {
            return None;
        }
        let mut counted = symptoms.clone();
        if counted.len() == 1 {
            counted.insert(NO_OTHER_SYMPTOMS.into());
        }
        Some(counted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(terms: &[&str]) -> BTreeSet<ArcStr> {
        terms.iter().map(|t| ArcStr::from(*t)).collect()
    }

    #[test]
    fn curated_terms_classify_as_death() {
        let mut classifier = DeathClassifier::default();
        assert!(classifier.is_death(&set(&["pyrexia", "sudden death"])));
        assert!(!classifier.has_unmatched());
    }

    #[test]
    fn deathlike_terms_audited_not_matched() {
        let mut classifier = DeathClassifier::default();
        assert!(!classifier.is_death(&set(&["accidental death of a relative"])));
        assert!(!classifier.is_death(&set(&["accidental death of a relative"])));
        assert!(!classifier.is_death(&set(&["pyrexia"])));
        let ranked = classifier.ranked_unmatched();
        assert_eq!(ranked.len(), 1);
        assert_eq!(&**ranked[0].0, "accidental death of a relative");
        assert_eq!(ranked[0].1, 2);
    }

    #[test]
    fn audit_counts_each_distinct_term_once_per_record() {
        let mut classifier = DeathClassifier::default();
        // two deathlike terms in one record: each tallied once
        assert!(!classifier.is_death(&set(&["near death experience", "death anxiety"])));
        let ranked = classifier.ranked_unmatched();
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|(_, n)| *n == 1));
    }

    #[test]
    fn audit_ranked_by_descending_count() {
        let mut classifier = DeathClassifier::default();
        classifier.is_death(&set(&["death anxiety"]));
        classifier.is_death(&set(&["near death experience"]));
        classifier.is_death(&set(&["near death experience"]));
        let ranked = classifier.ranked_unmatched();
        assert_eq!(&**ranked[0].0, "near death experience");
        assert_eq!(ranked[0].1, 2);
    }

    #[test]
    fn keyword_filter_adds_sentinel_for_single_symptom() {
        let filter = KeywordFilter::new(["Pyrexia"]);
        let counted = filter.apply(&set(&["pyrexia"])).unwrap();
        assert!(counted.contains(NO_OTHER_SYMPTOMS));
        let counted = filter.apply(&set(&["pyrexia", "chills"])).unwrap();
        assert!(!counted.contains(NO_OTHER_SYMPTOMS));
        assert!(filter.apply(&set(&["chills"])).is_none());
    }

    #[test]
    fn expansion_is_cosmetic_only() {
        assert_eq!(expand("pyrexia"), "pyrexia (fever)");
        assert_eq!(expand("some novel term"), "some novel term");
    }
}
