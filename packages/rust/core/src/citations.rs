//! Legal citation detection.
//!
//! Two implementations sit behind [`CitationDetector`]: a native regex
//! detector for U.S. reporter, short-form and statute citations, and a
//! subprocess detector that pipes text to an external script and reads
//! JSON back. All offsets are character offsets into the scanned text.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use annodemo_shared::{AnnoDemoError, CitationsConfig, DetectorKind, Result, TextSpan};
use annodemo_text::{char_len, char_span};

/// A citation found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CitationMatch {
    pub text: String,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    /// Citation class, e.g. `FullCaseCitation`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Finds citations in text.
pub trait CitationDetector: Send + Sync {
    /// Matches in text order, non-overlapping.
    fn detect(&self, text: &str) -> Result<Vec<CitationMatch>>;

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}

/// Build the detector selected in `[citations]`.
pub fn detector_from_config(config: &CitationsConfig) -> Box<dyn CitationDetector> {
    match config.detector {
        DetectorKind::Regex => Box::new(RegexCitationDetector),
        DetectorKind::Subprocess => Box::new(SubprocessCitationDetector::new(
            config.command.clone(),
            config.args.clone(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Regex detector
// ---------------------------------------------------------------------------

pub const FULL_CASE: &str = "FullCaseCitation";
pub const SHORT_CASE: &str = "ShortCaseCitation";
pub const ID_CITATION: &str = "IdCitation";
pub const STATUTE: &str = "StatuteCitation";

/// Reporter abbreviations, longest variants first.
const REPORTERS: &str = r"U\.\s?S\.|S\.\s?Ct\.|L\.\s?Ed\.(?:\s?2d)?|F\.\s?Supp\.(?:\s?[23]d)?|F\.\s?App'x|F\.(?:\s?(?:2d|3d|4th))?";

/// Words a case-name match may start with that belong to the sentence.
const LEADING_SIGNALS: &[&str] = &[
    "In", "See", "But", "And", "The", "Also", "Compare", "Accord", "Under", "Unlike", "Following",
];

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let word = r"[A-Z][\w'&-]*";
    let connector = r"(?:of|the|and|for|to|in|on|ex\s+rel\.)";
    let party = format!(r"{word}(?:\s+(?:{word}|{connector}))*");
    let case_name = format!(r"{party}\s+v\.\s+{party}(?:,\s+(?:Inc|Co|Corp|Ltd)\.)?");
    let pin = r"(?:,\s*\d{1,5}(?:[-–]\d{1,5})?)?";
    let paren = r"(?:\s+\((?:[^()\n]{0,40}?\s)?\d{4}\))?";

    let statute = r"\b\d{1,3}\s+U\.\s?S\.\s?C\.(?:\s?A\.)?\s+§§?\s*\d+[\w-]*(?:\([\w]+\))*";
    let short = format!(r"\b\d{{1,4}}\s+(?:{REPORTERS}),?\s+at\s+\d{{1,5}}(?:[-–]\d{{1,5}})?");
    let full = format!(
        r"(?:(?P<case>{case_name}),\s+)?\b\d{{1,4}}\s+(?:{REPORTERS})\s+\d{{1,5}}{pin}{paren}"
    );
    let id = r"\b[Ii]d\.(?:,?\s+at\s+\d{1,5}(?:[-–]\d{1,5})?)?";

    Regex::new(&format!(
        r"(?P<statute>{statute})|(?P<short>{short})|(?P<full>{full})|(?P<id>{id})"
    ))
    .expect("valid regex")
});

/// Native detector for common U.S. citation forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexCitationDetector;

impl CitationDetector for RegexCitationDetector {
    #[instrument(skip_all, fields(text_len = text.len()))]
    fn detect(&self, text: &str) -> Result<Vec<CitationMatch>> {
        let mut matches = Vec::new();

        for caps in CITATION_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let (kind, mut start) = if caps.name("statute").is_some() {
                (STATUTE, whole.start())
            } else if caps.name("short").is_some() {
                (SHORT_CASE, whole.start())
            } else if caps.name("id").is_some() {
                (ID_CITATION, whole.start())
            } else {
                (FULL_CASE, whole.start())
            };

            if let Some(case) = caps.name("case") {
                start += signal_prefix_len(case.as_str());
            }

            let end = whole.end();
            let (char_start, char_end) = char_span(text, TextSpan::new(start, end));
            matches.push(CitationMatch {
                text: text[start..end].to_string(),
                start: char_start,
                end: char_end,
                kind: kind.to_string(),
            });
        }

        debug!(count = matches.len(), "citations detected");
        Ok(matches)
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// Bytes of leading sentence words (`In`, `See`, ...) to drop from a case
/// name, as long as a `v.` remains after them.
fn signal_prefix_len(case: &str) -> usize {
    let mut skipped = 0;
    loop {
        let rest = &case[skipped..];
        let Some(signal) = LEADING_SIGNALS.iter().find(|s| {
            rest.strip_prefix(**s)
                .is_some_and(|after| after.starts_with(' ') && after.trim_start().contains(" v. "))
        }) else {
            return skipped;
        };
        skipped += signal.len();
        skipped += rest[signal.len()..].len() - rest[signal.len()..].trim_start().len();
    }
}

// ---------------------------------------------------------------------------
// Subprocess detector
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DetectorOutput {
    citations: Vec<CitationMatch>,
}

/// Runs an external detector: text on stdin, `{"citations": [...]}` on
/// stdout.
#[derive(Debug, Clone)]
pub struct SubprocessCitationDetector {
    command: String,
    args: Vec<String>,
}

impl SubprocessCitationDetector {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl CitationDetector for SubprocessCitationDetector {
    #[instrument(skip_all, fields(cmd = %self.command, text_len = text.len()))]
    fn detect(&self, text: &str) -> Result<Vec<CitationMatch>> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AnnoDemoError::Citation(format!(
                    "failed to spawn detector: {e}. Is `{}` installed?",
                    self.command
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnnoDemoError::Citation("failed to capture detector stdin".into()))?;

        // Feed stdin from a separate thread so a chatty child cannot block
        // on a full stdout pipe while we are still writing.
        let input = text.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|e| AnnoDemoError::Citation(format!("detector did not finish: {e}")))?;

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(AnnoDemoError::Citation(format!(
                    "failed to write to detector stdin: {e}"
                )));
            }
            Err(_) => return Err(AnnoDemoError::Citation("detector stdin writer panicked".into())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnnoDemoError::Citation(format!(
                "detector exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let parsed: DetectorOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            AnnoDemoError::Citation(format!("invalid detector output: {e}"))
        })?;

        let text_chars = char_len(text);
        let mut matches: Vec<CitationMatch> = parsed
            .citations
            .into_iter()
            .filter(|m| {
                let in_bounds = m.start < m.end && m.end <= text_chars;
                if !in_bounds {
                    warn!(
                        start = m.start,
                        end = m.end,
                        text_chars,
                        "dropping detector match with an invalid span"
                    );
                }
                in_bounds
            })
            .collect();
        matches.sort_by_key(|m| (m.start, m.end));
        matches.dedup_by(|next, prev| next.start < prev.end);

        debug!(count = matches.len(), "citations detected");
        Ok(matches)
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<(String, &'static str)> {
        RegexCitationDetector
            .detect(text)
            .unwrap()
            .into_iter()
            .map(|m| {
                let kind = match m.kind.as_str() {
                    FULL_CASE => FULL_CASE,
                    SHORT_CASE => SHORT_CASE,
                    ID_CITATION => ID_CITATION,
                    _ => STATUTE,
                };
                (m.text, kind)
            })
            .collect()
    }

    #[test]
    fn detects_reporter_short_and_statute_forms() {
        let text = "In Bush v. Gore, 531 U.S. 98 (2000), the Court held. Id. at 100. \
                    See 531 U.S., at 99; 2 U.S.C. § 441b; 130 S. Ct. 876; \
                    558 F.3d 1224; 5 L. Ed. 2d 12.";
        assert_eq!(
            detect(text),
            vec![
                ("Bush v. Gore, 531 U.S. 98 (2000)".to_string(), FULL_CASE),
                ("Id. at 100".to_string(), ID_CITATION),
                ("531 U.S., at 99".to_string(), SHORT_CASE),
                ("2 U.S.C. § 441b".to_string(), STATUTE),
                ("130 S. Ct. 876".to_string(), FULL_CASE),
                ("558 F.3d 1224".to_string(), FULL_CASE),
                ("5 L. Ed. 2d 12".to_string(), FULL_CASE),
            ]
        );
    }

    #[test]
    fn case_name_and_pin_cite() {
        let found = detect("Buckley v. Valeo, 424 U.S. 1, 19-20 (1976) (per curiam).");
        assert_eq!(found[0].0, "Buckley v. Valeo, 424 U.S. 1, 19-20 (1976)");
    }

    #[test]
    fn court_parenthetical() {
        let found = detect("Doe v. Roe, 558 F.3d 1224 (D.C. Cir. 2009).");
        assert_eq!(found[0].0, "Doe v. Roe, 558 F.3d 1224 (D.C. Cir. 2009)");
    }

    #[test]
    fn sentence_end_is_not_part_of_case_name() {
        let found = detect("The Court agreed. Austin v. Michigan Chamber of Commerce, 494 U.S. 652 (1990).");
        assert_eq!(
            found[0].0,
            "Austin v. Michigan Chamber of Commerce, 494 U.S. 652 (1990)"
        );
    }

    #[test]
    fn offsets_are_characters() {
        let text = "§§ — Id. at 5";
        let matches = RegexCitationDetector.detect(text).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start, 5);
        assert_eq!(matches[0].end, 13);
        let sliced: String = text.chars().skip(matches[0].start).take(8).collect();
        assert_eq!(sliced, "Id. at 5");
    }

    #[test]
    fn plain_text_has_no_citations() {
        assert!(detect("It is a truth universally acknowledged. David. 12 apples at 3.").is_empty());
    }

    #[test]
    fn signal_prefix_is_trimmed() {
        assert_eq!(signal_prefix_len("See Bush v. Gore"), "See ".len());
        assert_eq!(signal_prefix_len("But In Bush v. Gore"), "But In ".len());
        assert_eq!(signal_prefix_len("Bush v. Gore"), 0);
        // "The" stays when dropping it would leave no "v."
        assert_eq!(signal_prefix_len("The v. Gore"), 0);
    }

    #[test]
    fn config_selects_detector() {
        let mut config = CitationsConfig::default();
        assert_eq!(detector_from_config(&config).name(), "regex");
        config.detector = DetectorKind::Subprocess;
        assert_eq!(detector_from_config(&config).name(), "subprocess");
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_detector_parses_output() {
        let script = r#"cat > /dev/null; printf '%s' '{"citations":[{"text":"Id.","start":10,"end":13,"type":"IdCitation"},{"text":"531 U.S. 98","start":0,"end":11,"type":"FullCaseCitation"}]}'"#;
        let detector = SubprocessCitationDetector::new("sh", vec!["-c".into(), script.into()]);
        let matches = detector.detect("531 U.S. 98 Id.").unwrap();
        assert_eq!(matches.len(), 1, "overlapping match is dropped");
        assert_eq!(matches[0].kind, "FullCaseCitation");
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_failure_is_citation_error() {
        let detector = SubprocessCitationDetector::new(
            "sh",
            vec!["-c".into(), "cat > /dev/null; echo boom >&2; exit 3".into()],
        );
        let err = detector.detect("text").unwrap_err();
        assert!(matches!(err, AnnoDemoError::Citation(ref m) if m.contains("boom")));
    }

    #[test]
    fn missing_command_is_citation_error() {
        let detector = SubprocessCitationDetector::new("annodemo-no-such-detector", vec![]);
        let err = detector.detect("text").unwrap_err();
        assert!(err.to_string().contains("failed to spawn detector"));
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_spans_outside_text_are_dropped() {
        let script = r#"cat > /dev/null; printf '%s' '{"citations":[{"text":"x","start":10,"end":5,"type":"IdCitation"},{"text":"y","start":3,"end":99,"type":"IdCitation"},{"text":"z","start":4,"end":4,"type":"IdCitation"},{"text":"Id.","start":12,"end":15,"type":"IdCitation"}]}'"#;
        let detector = SubprocessCitationDetector::new("sh", vec!["-c".into(), script.into()]);
        let matches = detector.detect("531 U.S. 98 Id.").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].start, matches[0].end), (12, 15));
        assert_eq!(matches[0].text, "Id.");
    }
}
