//! Prompt assembly.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{AdsReport, AnalyticsReport, DateRange, MarketingDataset, ProviderResult, SiteReport};
use crate::Result;

const PREAMBLE: &str = "You are a digital marketing analyst AI assistant. Your role is to analyze \
marketing data and provide actionable insights.";

const CLOSING: &str = "Please analyze this data and provide:\n\
1. **Summary**: Key performance highlights\n\
2. **Key Trends**: Important patterns and changes\n\
3. **Recommendations**: Actionable insights and next steps\n\n\
Format your response with clear sections and bullet points where appropriate.";

/// Data sections in the order they appear in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Ads,
    Analytics,
    Site,
}

impl Section {
    fn heading(&self) -> &'static str {
        match self {
            Section::Ads => "=== GOOGLE ADS PERFORMANCE ===",
            Section::Analytics => "=== GOOGLE ANALYTICS 4 DATA ===",
            Section::Site => "=== WORDPRESS SITE DATA ===",
        }
    }
}

/// Builds the model prompt for a query.
///
/// Sections always render ads, analytics, site regardless of the order they
/// were added in. Sources that failed are left out entirely, error text included.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    query: String,
    range: DateRange,
    sections: BTreeMap<Section, String>,
}

impl PromptBuilder {
    pub fn new(query: impl Into<String>, range: DateRange) -> Self {
        Self {
            query: query.into(),
            range,
            sections: BTreeMap::new(),
        }
    }

    /// Builder with every available section of `dataset` added.
    pub fn for_dataset(query: impl Into<String>, dataset: &MarketingDataset) -> Result<Self> {
        Self::new(query, dataset.date_range)
            .ads(&dataset.ads)?
            .analytics(&dataset.analytics)?
            .site(&dataset.site)
    }

    pub fn ads(self, ads: &ProviderResult<AdsReport>) -> Result<Self> {
        self.section(Section::Ads, ads)
    }

    pub fn analytics(self, analytics: &ProviderResult<AnalyticsReport>) -> Result<Self> {
        self.section(Section::Analytics, analytics)
    }

    pub fn site(self, site: &ProviderResult<SiteReport>) -> Result<Self> {
        self.section(Section::Site, site)
    }

    fn section<T: Serialize>(mut self, section: Section, result: &ProviderResult<T>) -> Result<Self> {
        if let Some(report) = result.ready() {
            self.sections.insert(section, serde_json::to_string_pretty(report)?);
        }
        Ok(self)
    }

    pub fn build(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push_str("\n\n");
        prompt.push_str(&format!("User Query: {}\n\n", self.query));
        prompt.push_str(&format!(
            "Marketing Data for Period: {} to {}\n\n",
            self.range.start, self.range.end
        ));

        for (section, body) in &self.sections {
            prompt.push_str(section.heading());
            prompt.push('\n');
            prompt.push_str(body);
            prompt.push_str("\n\n");
        }

        prompt.push_str(CLOSING);
        prompt
    }
}
