//! Filter-results stage

use crate::pipeline::Stage;
use async_trait::async_trait;
use quarry_core::{RequestContext, Result};
use quarry_safeguard::{SafeguardChecker, PROMPT_INJECTION};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Screens search-result content for prompt-injection attempts before it can
/// reach the responder's prompt. Skipped when the injection check is off or
/// no checker is configured. Fail-open on checker errors.
pub struct FilterResultsStage {
    checker: Option<Arc<dyn SafeguardChecker>>,
}

impl FilterResultsStage {
    pub fn new(checker: Option<Arc<dyn SafeguardChecker>>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl Stage for FilterResultsStage {
    fn name(&self) -> &'static str {
        "filter-results"
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        if !ctx.request.features.injection_check {
            return Ok(());
        }
        let Some(checker) = &self.checker else {
            return Ok(());
        };

        // Flatten all result contents, remembering where each came from
        let mut pointers: Vec<(usize, usize)> = Vec::new();
        let mut contents: Vec<String> = Vec::new();
        for (search_idx, search) in ctx.search_results.iter().enumerate() {
            for (result_idx, result) in search.results.iter().enumerate() {
                pointers.push((search_idx, result_idx));
                contents.push(result.content.clone());
            }
        }
        if contents.is_empty() {
            return Ok(());
        }

        let verdicts = checker.check_items(&PROMPT_INJECTION, &contents).await;

        let mut flagged: HashSet<(usize, usize)> = HashSet::new();
        for item in verdicts {
            match item.verdict {
                Ok(verdict) if verdict.violation => {
                    let (search_idx, result_idx) = pointers[item.index];
                    debug!(
                        url = %ctx.search_results[search_idx].results[result_idx].url,
                        rationale = %verdict.rationale,
                        "dropping injected search result"
                    );
                    flagged.insert((search_idx, result_idx));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "injection check failed, keeping result");
                }
            }
        }
        if flagged.is_empty() {
            return Ok(());
        }

        metrics::counter!("quarry_results_filtered_total").increment(flagged.len() as u64);

        // Rebuild, dropping flagged results and any search left empty
        let searches = std::mem::take(&mut ctx.search_results);
        ctx.search_results = searches
            .into_iter()
            .enumerate()
            .filter_map(|(search_idx, mut search)| {
                search.results = search
                    .results
                    .into_iter()
                    .enumerate()
                    .filter(|(result_idx, _)| !flagged.contains(&(search_idx, *result_idx)))
                    .map(|(_, result)| result)
                    .collect();
                (!search.results.is_empty()).then_some(search)
            })
            .collect();

        Ok(())
    }
}
