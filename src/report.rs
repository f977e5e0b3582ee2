//! Human-readable rendering of a finished run.

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::evidence::Evidence;
use crate::orchestrator::{LoopOutcome, StopReason};
use crate::synthesis::{Handoff, Report, SynthesisError, Synthesizer};

const EXCERPT_CHARS: usize = 600;

const LINK_TEXT: &[char] = &['[', ']', '(', ')'];
const TABLE_CELL: &[char] = &['|'];

/// Flattens `s` onto one line and backslash-escapes every char in `special`.
/// A newline would end a heading, list item or table row early.
fn inline(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' | '\r' => out.push(' '),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn excerpt(content: &str) -> String {
    let content = inline(content, &[]);
    if content.len() > EXCERPT_CHARS {
        let end = content.floor_char_boundary(EXCERPT_CHARS);
        format!("{}...", &content[..end])
    } else {
        content
    }
}

fn write_evidence(out: &mut String, pool: &[Evidence]) {
    for (i, ev) in pool.iter().enumerate() {
        let citation = ev.citation();
        let _ = write!(
            out,
            "{}. [{}]({}) ({}",
            i + 1,
            inline(citation.title(), LINK_TEXT),
            citation.url(),
            ev.source()
        );
        if let Some(date) = citation.date() {
            let _ = write!(out, ", {date}");
        }
        out.push_str(")\n");
        if let Some(id) = ev.paper_id() {
            let _ = writeln!(out, "   - id: {id}");
        }
        let also = ev.also_found_in();
        if !also.is_empty() {
            let _ = writeln!(out, "   - also found in: {}", also.join(", "));
        }
        let _ = writeln!(out, "   > {}", excerpt(ev.content()));
    }
}

fn write_summary(out: &mut String, question: &str, reason: StopReason, pool: &[Evidence]) {
    let _ = writeln!(out, "# Research: {}\n", inline(question, &[]));
    let _ = writeln!(out, "**Outcome:** {reason}");
    if !reason.is_satisfied() {
        out.push_str("\nThe judge did not confirm the evidence is sufficient.\n");
    }
    out.push('\n');

    let _ = writeln!(out, "## Evidence ({})\n", pool.len());
    if pool.is_empty() {
        out.push_str("No evidence found.\n");
    } else {
        write_evidence(out, pool);
    }
}

/// Full outcome: summary, evidence, one row per pass, and source errors.
pub fn render_markdown(outcome: &LoopOutcome) -> String {
    let mut out = String::new();
    write_summary(&mut out, &outcome.question, outcome.reason, &outcome.pool);

    let budget = &outcome.budget;
    let _ = writeln!(
        out,
        "\n## Budget\n\n- iterations: {}\n- tokens: {}\n- elapsed: {:.1}s\n- final query: {}",
        budget.iterations,
        budget.tokens,
        budget.elapsed.as_secs_f64(),
        inline(&outcome.final_query, &[])
    );

    if !outcome.history.is_empty() {
        out.push_str("\n## Search passes\n\n");
        out.push_str("| # | Query | Found | Added | Failed |\n");
        out.push_str("|---|---|---|---|---|\n");
        for (i, pass) in outcome.history.iter().enumerate() {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                i + 1,
                inline(pass.query(), TABLE_CELL),
                pass.total_found(),
                pass.evidence().len(),
                inline(&pass.sources_failed().join(", "), TABLE_CELL)
            );
        }
    }

    let errors: Vec<(usize, &String)> = outcome
        .history
        .iter()
        .enumerate()
        .flat_map(|(i, pass)| pass.errors().iter().map(move |e| (i + 1, e)))
        .collect();
    if !errors.is_empty() {
        out.push_str("\n## Source errors\n\n");
        for (iteration, error) in errors {
            let _ = writeln!(out, "- pass {iteration}: {}", inline(error, &[]));
        }
    }

    out
}

/// Pool kept from the passes that completed before the run was aborted.
pub fn render_aborted(question: &str, pool: &[Evidence], error: &impl std::fmt::Display) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Research: {}\n", inline(question, &[]));
    let _ = writeln!(out, "**Aborted:** {}\n", inline(&error.to_string(), &[]));
    let _ = writeln!(out, "## Evidence gathered before the failure ({})\n", pool.len());
    write_evidence(&mut out, pool);
    out
}

pub fn render_json(outcome: &LoopOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(outcome)
}

/// Model-free [`Synthesizer`]: lists the final pool under the question.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceDigest;

#[async_trait]
impl Synthesizer for EvidenceDigest {
    async fn synthesize(&self, handoff: &Handoff) -> Result<Report, SynthesisError> {
        let mut text = String::new();
        write_summary(
            &mut text,
            &handoff.question,
            handoff.outcome_reason,
            &handoff.final_evidence_pool,
        );
        Ok(Report {
            text,
            tokens_consumed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::budget::BudgetState;
    use crate::evidence::{Citation, SearchResult};
    use crate::orchestrator::BudgetKind;

    fn outcome(reason: StopReason) -> LoopOutcome {
        let trial = Evidence::new(
            "Semaglutide reduced body weight by 15% over 68 weeks.",
            Citation::new("pubmed", "STEP 1 [trial]", "https://pubmed.ncbi.nlm.nih.gov/33567185/")
                .with_date("2021-03-18"),
        )
        .unwrap()
        .absorb_sources(["europepmc"]);
        let pass = SearchResult::new(
            "semaglutide | obesity".into(),
            vec![trial.clone()],
            vec!["pubmed".into(), "europepmc".into(), "trials".into()],
            vec![("trials".into(), "timed out after 1000ms".into())],
            2,
        );
        LoopOutcome {
            question: "Does semaglutide\nwork?".into(),
            reason,
            pool: vec![trial],
            history: vec![pass],
            budget: BudgetState {
                iterations: 1,
                elapsed: Duration::from_millis(1500),
                tokens: 420,
            },
            final_query: "semaglutide | obesity".into(),
        }
    }

    #[test]
    fn titles_and_queries_stay_on_one_line() {
        let mut run = outcome(StopReason::MaxIterations);
        run.pool[0] = Evidence::new(
            "Line one\nline two",
            Citation::new("pubmed", "Effect (a)\r\nof [b]", "https://example.org/a"),
        )
        .unwrap();
        run.final_query = "glp-1\nweight".into();

        let text = render_markdown(&run);

        assert!(text.contains("1. [Effect \\(a\\)  of \\[b\\]](https://example.org/a) (pubmed)\n"));
        assert!(text.contains("   > Line one line two\n"));
        assert!(text.contains("- final query: glp-1 weight\n"));
    }

    #[test]
    fn long_content_is_truncated_on_char_boundary() {
        let text = "é".repeat(EXCERPT_CHARS);
        let cut = excerpt(&text);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= EXCERPT_CHARS + 3);
    }

    #[test]
    fn markdown_includes_sections() {
        let text = render_markdown(&outcome(StopReason::JudgeSatisfied));

        assert!(text.starts_with("# Research: Does semaglutide work?\n"));
        assert!(text.contains("**Outcome:** JUDGE_SATISFIED"));
        assert!(text.contains(
            "1. [STEP 1 \\[trial\\]](https://pubmed.ncbi.nlm.nih.gov/33567185/) (pubmed, 2021-03-18)"
        ));
        assert!(text.contains("   - id: PMID:33567185"));
        assert!(text.contains("   - also found in: europepmc"));
        assert!(text.contains("| 1 | semaglutide \\| obesity | 2 | 1 | trials |"));
        assert!(text.contains("- pass 1: trials: timed out after 1000ms"));
        assert!(text.contains("- tokens: 420"));
        assert!(!text.contains("did not confirm"));
    }

    #[test]
    fn markdown_flags_unsatisfied_outcomes() {
        let text = render_markdown(&outcome(StopReason::BudgetExhausted(BudgetKind::Tokens)));
        assert!(text.contains("**Outcome:** BUDGET_EXHAUSTED(token)"));
        assert!(text.contains("did not confirm"));
    }

    #[test]
    fn json_carries_reason_and_pool() {
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&outcome(StopReason::NoProgress)).unwrap()).unwrap();
        assert_eq!(json["reason"], "no_progress");
        assert_eq!(json["pool"].as_array().unwrap().len(), 1);
        assert_eq!(json["budget"]["elapsed"], 1500);
    }

    #[test]
    fn aborted_run_keeps_earlier_evidence() {
        let kept = outcome(StopReason::Cancelled).pool;
        let text = render_aborted("q", &kept, &"all 2 sources failed for query 'q'");

        assert!(text.contains("**Aborted:** all 2 sources failed"));
        assert!(text.contains("## Evidence gathered before the failure (1)"));
        assert!(text.contains("1. [STEP 1"));
    }

    #[tokio::test]
    async fn digest_lists_the_handed_off_pool() {
        let handoff = Handoff::from(outcome(StopReason::MaxIterations));

        let report = EvidenceDigest.synthesize(&handoff).await.unwrap();

        assert_eq!(report.tokens_consumed, 0);
        assert!(report.text.contains("**Outcome:** MAX_ITERATIONS"));
        assert!(report.text.contains("## Evidence (1)"));
        assert!(!report.text.contains("## Search passes"));
    }

    #[tokio::test]
    async fn digest_of_empty_pool_says_so() {
        let mut empty = outcome(StopReason::Cancelled);
        empty.pool.clear();

        let report = EvidenceDigest.synthesize(&Handoff::from(empty)).await.unwrap();

        assert!(report.text.contains("No evidence found."));
    }
}
