//! Final report rendering and persistence.

use std::sync::Arc;

use tracing::info;

use qr_core::{Error, ReportStore, ResearchContext};

/// Render the ledger as a markdown report.
///
/// Depends on nothing but `context`, so the same ledger always renders the
/// same bytes.
pub fn render_report(context: &ResearchContext) -> String {
    let root = context.root_topic();

    let findings = context
        .rounds()
        .map(|(topic, summary)| format!("### Research Topic: {}\n\n{}", topic, summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "# Research Summary: {root}\n\n\
         ## Introduction\n\
         This document collects research findings on \"{root}\". The research ran \
         in iterative rounds of querying the web, reading the results and \
         summarizing what was learned.\n\n\
         ## Research Findings\n\
         {findings}\n\n\
         ## Conclusion\n\
         These findings give an overview of \"{root}\" and the related topics \
         explored along the way. Each section above was synthesized from the \
         sources found for its query.\n"
    )
}

/// Renders reports and hands them to a [`ReportStore`].
pub struct ReportAssembler {
    store: Arc<dyn ReportStore>,
}

impl ReportAssembler {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Write the report for `context`, keyed by its root topic.
    /// Returns the key and the store's location for it.
    pub async fn assemble(&self, context: &ResearchContext) -> Result<(String, String), Error> {
        let key = context.root_topic().to_string();
        let report = render_report(context);
        let location = self.store.write(&key, &report).await?;
        info!(topic = %key, rounds = context.summaries().len(), location = %location, "Report written");
        Ok((key, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qr_core::testing::MemoryReportStore;

    fn ledger() -> ResearchContext {
        ResearchContext::new("quantum error correction", 1)
            .with_topic("surface code threshold")
            .with_summary("Thresholds sit near one percent.")
            .with_topic("fast decoders")
            .with_summary("Union-find decoders run in near linear time.")
    }

    #[test]
    fn test_report_layout() {
        let report = render_report(&ledger());

        assert!(report.starts_with("# Research Summary: quantum error correction\n\n## Introduction\n"));
        let intro = report.find("## Introduction").unwrap();
        let findings = report.find("## Research Findings").unwrap();
        let first = report
            .find("### Research Topic: surface code threshold\n\nThresholds sit near one percent.")
            .unwrap();
        let second = report
            .find("### Research Topic: fast decoders\n\nUnion-find decoders run in near linear time.")
            .unwrap();
        let conclusion = report.find("## Conclusion").unwrap();
        assert!(intro < findings && findings < first && first < second && second < conclusion);
    }

    #[test]
    fn test_report_is_deterministic() {
        assert_eq!(render_report(&ledger()), render_report(&ledger()));
    }

    #[test]
    fn test_report_with_no_rounds() {
        let report = render_report(&ResearchContext::new("empty topic", 0));
        assert!(report.contains("# Research Summary: empty topic"));
        assert!(!report.contains("### Research Topic"));
    }

    #[tokio::test]
    async fn test_assemble_writes_under_root_topic() {
        let store = Arc::new(MemoryReportStore::new());
        let assembler = ReportAssembler::new(store.clone());

        let (key, location) = assembler.assemble(&ledger()).await.unwrap();
        assert_eq!(key, "quantum error correction");
        assert_eq!(location, "memory://quantum error correction");
        assert_eq!(store.get(&key).unwrap(), render_report(&ledger()));
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let store = Arc::new(MemoryReportStore::new());
        store.fail_writes();

        let err = ReportAssembler::new(store).assemble(&ledger()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
