use regex::Regex;
use std::sync::LazyLock;

use crate::detector::{PageSnapshot, RawClickable};

/// Entry-point candidates, tried in order: a page with no visible form often
/// hides it behind one of these.
static ENTRY_POINT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sign\s*up",
        r"register",
        r"create\s+(an?\s+)?account",
        r"apply(\s+now)?",
        r"get\s+started",
        r"start\s+(your\s+)?application",
        r"\bjoin\b",
        r"book(\s+now)?|schedule",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

/// Button text that advances a wizard without finishing it.
static NEXT_STEP_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bnext\b|\bcontinue\b|\bproceed\b|weiter|siguiente|continuer|suivant")
        .unwrap()
});

/// Button text that finishes a form.
static FINAL_SUBMIT_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bsubmit\b|\bfinish\b|\bcomplete\b|\bsend\b|\bapply\b|\bregister\b|sign\s*up|create\s+account|\bsave\b|\bdone\b|enviar|absenden",
    )
    .unwrap()
});

static CAPTCHA_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)recaptcha|h-?captcha|turnstile|cf-challenge|captcha").unwrap()
});

static SUCCESS_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)thank[\s_-]*you|success|confirmation|confirmed|welcome|complete[d]?|received")
        .unwrap()
});

/// What clicking a submit candidate means for the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitKind {
    /// Advances to another step; detection loops.
    NextStep,
    /// Final submission; verification follows.
    Final,
}

/// A clickable chosen to submit the current form.
#[derive(Debug, Clone)]
pub struct SubmitCandidate {
    pub selector: String,
    pub kind: SubmitKind,
}

/// First clickable whose text matches an entry-point pattern, in pattern
/// priority order (the ordered selector list from the workflow contract).
pub fn find_entry_point(snapshot: &PageSnapshot) -> Option<&RawClickable> {
    ENTRY_POINT_PATTERNS.iter().find_map(|pattern| {
        snapshot
            .clickables
            .iter()
            .find(|c| c.text.as_deref().is_some_and(|t| pattern.is_match(t)))
    })
}

/// Choose a submit control for the form at `form_index` (None = orphan form).
///
/// Priority: next-step buttons inside the form, then submit-flavored buttons
/// inside the form, then submit-typed controls anywhere, then any
/// final-submit text anywhere. The matched text decides whether this is a
/// wizard step or the final submission.
pub fn find_submit_candidate(
    snapshot: &PageSnapshot,
    form_index: Option<usize>,
) -> Option<SubmitCandidate> {
    let in_form = |c: &&RawClickable| form_index.is_none() || c.form_index == form_index;

    let scoped: Vec<&RawClickable> = snapshot.clickables.iter().filter(in_form).collect();

    if let Some(c) = scoped.iter().find(|c| NEXT_STEP_PATTERNS.is_match(text_of(c))) {
        return Some(SubmitCandidate {
            selector: c.selector.clone(),
            kind: SubmitKind::NextStep,
        });
    }
    if let Some(c) = scoped
        .iter()
        .find(|c| FINAL_SUBMIT_PATTERNS.is_match(text_of(c)))
    {
        return Some(SubmitCandidate {
            selector: c.selector.clone(),
            kind: SubmitKind::Final,
        });
    }
    // Submit-typed controls count even with unhelpful text.
    if let Some(c) = scoped
        .iter()
        .find(|c| c.input_type.as_deref() == Some("submit"))
    {
        let kind = if NEXT_STEP_PATTERNS.is_match(text_of(c)) {
            SubmitKind::NextStep
        } else {
            SubmitKind::Final
        };
        return Some(SubmitCandidate {
            selector: c.selector.clone(),
            kind,
        });
    }
    // Last resort: look outside the form.
    snapshot
        .clickables
        .iter()
        .find(|c| {
            c.input_type.as_deref() == Some("submit") || FINAL_SUBMIT_PATTERNS.is_match(text_of(c))
        })
        .map(|c| SubmitCandidate {
            selector: c.selector.clone(),
            kind: if NEXT_STEP_PATTERNS.is_match(text_of(c)) {
                SubmitKind::NextStep
            } else {
                SubmitKind::Final
            },
        })
}

fn text_of(c: &RawClickable) -> &str {
    c.text.as_deref().unwrap_or("")
}

/// Captcha indicators: challenge iframes or marker classes/selectors.
pub fn detect_captcha(snapshot: &PageSnapshot) -> bool {
    if snapshot.frame_urls.iter().any(|u| CAPTCHA_MARKERS.is_match(u)) {
        return true;
    }
    snapshot.elements.iter().any(|e| {
        e.css_classes.as_deref().is_some_and(|c| CAPTCHA_MARKERS.is_match(c))
            || CAPTCHA_MARKERS.is_match(&e.selector)
    }) || snapshot.clickables.iter().any(|c| {
        c.css_classes.as_deref().is_some_and(|s| CAPTCHA_MARKERS.is_match(s))
    })
}

/// Weak success signal after final submission: URL or title markers.
pub fn detect_success(snapshot: &PageSnapshot) -> bool {
    SUCCESS_MARKERS.is_match(&snapshot.title) || SUCCESS_MARKERS.is_match(&snapshot.url)
}
