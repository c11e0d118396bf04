use crate::language::text_matches_language;
use crate::model::{CompiledCheck, CompiledSignature};
use crate::snapshot::{element_text, FlattenedSnapshot};

#[derive(Clone, Debug, PartialEq)]
pub struct CheckVerdict {
    pub match_count: usize,
    pub element_exists: bool,
    /// Signed vote: `+weight` when presence agrees with `should_exist`, else `-weight`.
    pub contribution: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SignatureVerdict {
    pub total_weight: f64,
    pub score: f64,
    pub mismatches: usize,
}

impl SignatureVerdict {
    /// `max(0, score) / total_weight`, exactly 1.0 when nothing disagreed.
    pub fn confidence(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        if self.mismatches == 0 {
            return 1.0;
        }
        (self.score.max(0.0) / self.total_weight).clamp(0.0, 1.0)
    }
}

pub(crate) fn judge_check(snapshot: &FlattenedSnapshot, check: &CompiledCheck) -> CheckVerdict {
    let needs_text = check.text_lower.is_some() || check.spec.require_text_language.is_some();
    let match_count = snapshot
        .select(&check.selector)
        .filter(|element| {
            if !needs_text {
                return true;
            }
            let text = element_text(element);
            if let Some(needle) = check.text_lower.as_deref() {
                if !text.to_lowercase().contains(needle) {
                    return false;
                }
            }
            match check.spec.require_text_language.as_deref() {
                Some(code) => text_matches_language(&text, code),
                None => true,
            }
        })
        .count();

    let element_exists = match_count >= check.spec.min_count;
    let weight = check.spec.weight;
    let contribution = if element_exists == check.spec.should_exist {
        weight
    } else {
        -weight
    };

    CheckVerdict {
        match_count,
        element_exists,
        contribution,
    }
}

pub(crate) fn judge_signature(
    snapshot: &FlattenedSnapshot,
    signature: &CompiledSignature,
) -> SignatureVerdict {
    let mut verdict = SignatureVerdict {
        total_weight: 0.0,
        score: 0.0,
        mismatches: 0,
    };
    for check in &signature.checks {
        let outcome = judge_check(snapshot, check);
        verdict.total_weight += check.spec.weight;
        verdict.score += outcome.contribution;
        if outcome.contribution < 0.0 {
            verdict.mismatches += 1;
        }
    }
    verdict
}
