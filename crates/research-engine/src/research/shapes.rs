//! Record shapes for company research

use crate::record::{FieldKind, RecordShape};

/// Company background, grounded in the company's own site
pub fn company_background() -> RecordShape {
    let founded = RecordShape::new("Founded")
        .date("at", "Founding date (YYYY-MM-DD)")
        .list("by", FieldKind::Text, "Founders");

    RecordShape::new("CompanyBackground")
        .text("industry", "Primary industry the company operates in")
        .record("founded", founded, "When and by whom the company was founded")
        .text("description", "What the company does")
        .list("key_milestones", FieldKind::Text, "Notable milestones in the company's history")
        .text("current_status", "Current state of the company (growing, acquired, public, ...)")
}

/// Financial health of a company
pub fn financial_health() -> RecordShape {
    let round = RecordShape::new("FundingRound")
        .text("round", "Round name, e.g. Seed or Series A")
        .number("amount", "Amount raised in USD")
        .date("date", "Date of the round (YYYY-MM-DD)")
        .list("investors", FieldKind::Text, "Participating investors");

    RecordShape::new("FinancialHealth")
        .number("revenue", "Most recent annual revenue in USD")
        .list("funding_rounds", FieldKind::Record(round), "Funding rounds raised")
        .text("burn_rate", "Monthly cash burn")
        .number("runway_months", "Months of runway left")
}

/// Recent important news about a company
pub fn news() -> RecordShape {
    let item = RecordShape::new("NewsItem")
        .text("title", "Headline of the news item")
        .text("url", "Link to the article")
        .date("date_published", "Publication date (YYYY-MM-DD)");

    RecordShape::new("News").list("recent_important_news", FieldKind::Record(item), "Recent important news items")
}

/// Market position of a company
pub fn market_position() -> RecordShape {
    RecordShape::new("MarketPosition")
        .list("competitors", FieldKind::Text, "Main competitors")
        .list("unique_selling_points", FieldKind::Text, "What sets the company apart")
        .text("market_share", "Estimated market share")
}

/// Final report produced by synthesis
pub fn research_report() -> RecordShape {
    let grounded = RecordShape::new("GroundedInformation")
        .text("background", "Summary of the company background")
        .text("financial_health", "Summary of the company's financial health")
        .text("market_position", "Summary of the company's market position");

    RecordShape::new("ResearchReport")
        .record("grounded_information", grounded, "Facts grounded in the branch findings")
        .list("positive_aspects", FieldKind::Text, "Strengths of the company")
        .list("negative_aspects", FieldKind::Text, "Weaknesses and risks")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_background_accepts_nested_founding() {
        let value = json!({
            "industry": "Aerospace",
            "founded": { "at": "2002-05-06", "by": ["Ada"] },
            "key_milestones": ["First launch"]
        });
        assert!(company_background().validate(&value));
    }

    #[test]
    fn test_news_items_are_records() {
        let value = json!({ "recent_important_news": [
            { "title": "Acme raises Series B", "url": "https://news.test/b", "date_published": "2024-05-01" }
        ] });
        assert!(news().validate(&value));
        assert!(!news().validate(&json!({ "recent_important_news": ["just a headline"] })));
    }

    #[test]
    fn test_funding_round_dates_checked() {
        let value = json!({ "funding_rounds": [{ "round": "Seed", "date": "last spring" }] });
        let err = financial_health().conform(&value).unwrap_err();
        assert_eq!(err.path, "funding_rounds[0].date");
    }

    #[test]
    fn test_report_template() {
        let template = research_report().empty_template();
        assert!(template["grounded_information"].is_null());
        assert!(template["positive_aspects"].is_null());
    }
}
