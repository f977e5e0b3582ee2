use std::collections::BTreeMap;

use serde_json::Value;

use super::Citation;

pub(super) fn extract(citation: &Citation, metadata: &BTreeMap<String, Value>) -> Option<String> {
    from_metadata(metadata).or_else(|| from_url(citation.url()))
}

fn from_metadata(metadata: &BTreeMap<String, Value>) -> Option<String> {
    let field = |key: &str| -> Option<String> {
        match metadata.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    if let Some(pmid) = field("pmid").filter(|p| is_digits(p)) {
        return Some(format!("PMID:{pmid}"));
    }
    if let Some(doi) = field("doi") {
        return Some(format!("DOI:{}", doi.to_lowercase()));
    }
    field("nct_id")
        .filter(|id| is_nct(id))
        .map(|id| format!("NCT:{}", id.to_uppercase()))
}

fn from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if host.ends_with("pubmed.ncbi.nlm.nih.gov") {
        return segments
            .first()
            .filter(|s| is_digits(s))
            .map(|s| format!("PMID:{s}"));
    }
    if host.ends_with("ncbi.nlm.nih.gov") {
        return match segments.as_slice() {
            ["pubmed", id, ..] if is_digits(id) => Some(format!("PMID:{id}")),
            _ => None,
        };
    }
    if host.ends_with("europepmc.org") {
        return match segments.as_slice() {
            [kind, src, id, ..]
                if matches!(*kind, "article" | "abstract")
                    && src.eq_ignore_ascii_case("med")
                    && is_digits(id) =>
            {
                Some(format!("PMID:{id}"))
            }
            _ => None,
        };
    }
    if host == "doi.org" || host.ends_with(".doi.org") {
        let doi = parsed.path().trim_start_matches('/');
        return (!doi.is_empty()).then(|| format!("DOI:{}", doi.to_lowercase()));
    }
    if host.ends_with("clinicaltrials.gov") {
        return segments
            .iter()
            .find(|s| is_nct(s))
            .map(|s| format!("NCT:{}", s.to_uppercase()));
    }
    None
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_nct(s: &str) -> bool {
    s.len() == 11 && s.is_ascii() && s[..3].eq_ignore_ascii_case("nct") && is_digits(&s[3..])
}
