//! Block Kit payloads for the messages the bot posts.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::core::domain::{ContentRecord, Language};
use crate::core::reports::{ReportData, render_text};

/// Slack rejects header text over 150 characters.
const HEADER_LIMIT: usize = 150;
/// Section text tops out at 3000 characters.
const SECTION_LIMIT: usize = 3000;

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn header(text: &str) -> Value {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": truncate(text, HEADER_LIMIT), "emoji": true }
    })
}

fn section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": truncate(text, SECTION_LIMIT) }
    })
}

fn fields(items: &[String]) -> Value {
    let fields: Vec<Value> = items
        .iter()
        .map(|text| json!({ "type": "mrkdwn", "text": text }))
        .collect();
    json!({ "type": "section", "fields": fields })
}

fn context(text: &str) -> Value {
    json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": text }]
    })
}

/// A rendered message: notification fallback text plus blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct SlackMessage {
    pub text: String,
    pub blocks: Vec<Value>,
}

pub fn content_message(record: &ContentRecord, language: Language) -> SlackMessage {
    let (category_label, difficulty_label, read_more) = match language {
        Language::En => ("Category", "Difficulty", "Read more"),
        Language::Ko => ("카테고리", "난이도", "자세히 보기"),
    };

    let mut blocks = vec![
        header(&format!("📚 {}", record.title)),
        fields(&[
            format!(
                "*{}:* {}",
                category_label,
                record.category.display_name(language)
            ),
            format!(
                "*{}:* {} {}",
                difficulty_label,
                record.difficulty.emoji(),
                record.difficulty.display_name(language)
            ),
        ]),
        section(&record.summary),
    ];
    if let Some(url) = &record.notion_url {
        blocks.push(section(&format!("📖 <{}|{}>", url, read_more)));
    }
    if !record.tags.is_empty() {
        let tags: Vec<String> = record.tags.iter().map(|t| format!("`{}`", t)).collect();
        blocks.push(context(&format!("🏷️ {}", tags.join(" "))));
    }
    blocks.push(json!({ "type": "divider" }));

    SlackMessage {
        text: format!("📚 {}\n\n{}", record.title, record.summary),
        blocks,
    }
}

pub fn error_message(message: &str, details: &[(&str, String)], at: DateTime<Utc>) -> SlackMessage {
    let mut blocks = vec![
        header("⚠️ Daily-Bot error"),
        section(&format!("*Error:*\n```{}```", message)),
    ];
    if !details.is_empty() {
        let lines: Vec<String> = details
            .iter()
            .map(|(key, value)| format!("• {}: {}", key, value))
            .collect();
        blocks.push(section(&format!("*Details:*\n{}", lines.join("\n"))));
    }
    blocks.push(context(&format!("🕐 {}", at.format("%Y-%m-%d %H:%M:%S UTC"))));

    SlackMessage {
        text: format!("⚠️ Daily-Bot error: {}", message),
        blocks,
    }
}

pub fn report_message(report: &ReportData, page_url: Option<&str>, language: Language) -> SlackMessage {
    let l = match language {
        Language::En => [
            "Period", "Generated", "Succeeded", "Failed", "Retries", "Top categories",
            "Not covered yet", "Full report", "none",
        ],
        Language::Ko => [
            "기간", "총 발송", "성공", "실패", "재시도", "카테고리 분포 (Top 5)",
            "미다룬 카테고리", "상세 리포트 보기", "없음",
        ],
    };

    let mut blocks = vec![
        header(&format!("📈 {}", report.title(language))),
        section(&format!("*{}:* {}", l[0], report.period_label())),
        fields(&[
            format!("*{}:* {}", l[1], report.total_count),
            format!("*{}:* {}", l[2], report.success_count),
            format!("*{}:* {}", l[3], report.failed_count),
            format!("*{}:* {}", l[4], report.retry_count),
        ]),
    ];

    let top = report.top_categories(5);
    if !top.is_empty() {
        let lines: Vec<String> = top
            .iter()
            .map(|(category, count)| format!("• {}: {}", category.display_name(language), count))
            .collect();
        blocks.push(section(&format!("*{}:*\n{}", l[5], lines.join("\n"))));
    }

    let uncovered = if report.uncovered_categories.is_empty() {
        l[8].to_string()
    } else {
        report
            .uncovered_categories
            .iter()
            .map(|c| c.display_name(language))
            .collect::<Vec<_>>()
            .join(", ")
    };
    blocks.push(section(&format!("*{}:* {}", l[6], uncovered)));

    if let Some(url) = page_url {
        blocks.push(section(&format!("📖 <{}|{}>", url, l[7])));
    }

    SlackMessage {
        text: render_text(report, language),
        blocks,
    }
}
