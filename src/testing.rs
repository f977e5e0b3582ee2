//! Scripted adapters and judges shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::evidence::{Citation, Evidence};
use crate::judge::{Assessment, Judge, JudgeError, Progress};
use crate::source::{SourceAdapter, SourceError};

pub(crate) fn evidence(source: &str, content: &str) -> Evidence {
    let slug: String = content
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    Evidence::new(
        content,
        Citation::new(source, content, &format!("https://{source}.example/{slug}")),
    )
    .unwrap()
}

#[derive(Clone)]
pub(crate) enum Behavior {
    Items(Vec<Evidence>),
    Delayed(Duration, Vec<Evidence>),
    Fails,
    Hangs,
}

/// Plays its script in order; the last behaviour repeats forever.
pub(crate) struct ScriptedSource {
    name: String,
    script: Mutex<VecDeque<Behavior>>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl ScriptedSource {
    pub(crate) fn new(name: &str, script: Vec<Behavior>) -> Arc<Self> {
        assert!(!script.is_empty(), "script needs at least one behaviour");
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn returning(name: &str, items: Vec<Evidence>) -> Arc<Self> {
        Self::new(name, vec![Behavior::Items(items)])
    }

    pub(crate) fn failing(name: &str) -> Arc<Self> {
        Self::new(name, vec![Behavior::Fails])
    }

    pub(crate) fn hanging(name: &str) -> Arc<Self> {
        Self::new(name, vec![Behavior::Hangs])
    }

    pub(crate) fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }

    fn next(&self) -> Behavior {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Evidence>, SourceError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), max_results));
        match self.next() {
            Behavior::Items(items) => Ok(items),
            Behavior::Delayed(delay, items) => {
                tokio::time::sleep(delay).await;
                Ok(items)
            }
            Behavior::Fails => Err(SourceError::failed(format!("{} unavailable", self.name), true)),
            Behavior::Hangs => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub(crate) fn sources(list: Vec<Arc<ScriptedSource>>) -> Vec<(String, Arc<dyn SourceAdapter>)> {
    list.into_iter()
        .map(|s| (s.name.clone(), s as Arc<dyn SourceAdapter>))
        .collect()
}

#[derive(Clone)]
pub(crate) enum Verdict {
    Assess(Assessment),
    Fails,
    Hangs,
}

pub(crate) struct ScriptedJudge {
    script: Mutex<VecDeque<Verdict>>,
    calls: Mutex<Vec<(String, usize, Progress)>>,
}

impl ScriptedJudge {
    pub(crate) fn new(script: Vec<Verdict>) -> Arc<Self> {
        assert!(!script.is_empty(), "script needs at least one verdict");
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn never_satisfied() -> Arc<Self> {
        Self::new(vec![Verdict::Assess(Assessment::insufficient())])
    }

    /// `(question, pool size, progress)` for every call so far.
    pub(crate) fn calls(&self) -> Vec<(String, usize, Progress)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn assess(
        &self,
        question: &str,
        evidence: &[Evidence],
        progress: Progress,
    ) -> Result<Assessment, JudgeError> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), evidence.len(), progress));
        let verdict = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        };
        match verdict {
            Verdict::Assess(assessment) => Ok(assessment),
            Verdict::Fails => Err(JudgeError::Failed("model overloaded".into())),
            Verdict::Hangs => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
