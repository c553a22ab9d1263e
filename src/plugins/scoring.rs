use crate::plugins::{PluginError, ScoringFilter};
use crate::record::CrawlRecord;

/// Online page-importance scoring
///
/// A URL's sort value is its stored score scaled by the incoming value, so
/// records that have accumulated more importance are selected first.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpicScoringFilter;

impl OpicScoringFilter {
    pub fn new() -> Self {
        Self
    }
}

impl ScoringFilter for OpicScoringFilter {
    fn name(&self) -> &str {
        "opic"
    }

    fn generator_sort_value(
        &self,
        url: &str,
        record: &CrawlRecord,
        init_sort: f32,
    ) -> Result<f32, PluginError> {
        let value = record.score * init_sort;
        if value.is_nan() {
            return Err(PluginError::Scoring {
                name: self.name().to_string(),
                message: format!("score of {} is not a number", url),
            });
        }
        Ok(value)
    }
}
