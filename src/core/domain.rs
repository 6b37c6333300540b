use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::time::ScheduleTime;

/// Declares a closed set of lowercase string tags with `as_str`, `Display`
/// and `FromStr`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

text_enum!(
    /// Knowledge area a topic belongs to.
    Category {
        Network => "network",
        Os => "os",
        Algorithm => "algorithm",
        DataStructure => "data_structure",
        Database => "database",
        Oop => "oop",
        Ddd => "ddd",
        Tdd => "tdd",
        DesignPattern => "design_pattern",
        Architecture => "architecture",
        Security => "security",
        Devops => "devops",
    }
);

text_enum!(Difficulty {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

text_enum!(ContentStatus {
    Draft => "draft",
    Published => "published",
    Failed => "failed",
});

text_enum!(ScheduleStatus {
    Active => "active",
    Paused => "paused",
});

text_enum!(ExecutionStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
});

text_enum!(ReportKind {
    Weekly => "weekly",
    Monthly => "monthly",
});

text_enum!(
    /// Language used for prompts and rendered messages.
    Language {
        En => "en",
        Ko => "ko",
    }
);

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Network,
        Category::Os,
        Category::Algorithm,
        Category::DataStructure,
        Category::Database,
        Category::Oop,
        Category::Ddd,
        Category::Tdd,
        Category::DesignPattern,
        Category::Architecture,
        Category::Security,
        Category::Devops,
    ];

    pub fn display_name(&self, language: Language) -> &'static str {
        match language {
            Language::En => match self {
                Category::Network => "Network",
                Category::Os => "Operating Systems",
                Category::Algorithm => "Algorithms",
                Category::DataStructure => "Data Structures",
                Category::Database => "Databases",
                Category::Oop => "Object-Oriented Programming",
                Category::Ddd => "Domain-Driven Design",
                Category::Tdd => "Test-Driven Development",
                Category::DesignPattern => "Design Patterns",
                Category::Architecture => "Software Architecture",
                Category::Security => "Security",
                Category::Devops => "DevOps",
            },
            Language::Ko => match self {
                Category::Network => "네트워크",
                Category::Os => "운영체제",
                Category::Algorithm => "알고리즘",
                Category::DataStructure => "자료구조",
                Category::Database => "데이터베이스",
                Category::Oop => "객체지향 프로그래밍",
                Category::Ddd => "도메인 주도 설계",
                Category::Tdd => "테스트 주도 개발",
                Category::DesignPattern => "디자인 패턴",
                Category::Architecture => "소프트웨어 아키텍처",
                Category::Security => "보안",
                Category::Devops => "데브옵스",
            },
        }
    }
}

impl Difficulty {
    pub fn display_name(&self, language: Language) -> &'static str {
        match (language, self) {
            (Language::En, Difficulty::Beginner) => "Beginner",
            (Language::En, Difficulty::Intermediate) => "Intermediate",
            (Language::En, Difficulty::Advanced) => "Advanced",
            (Language::Ko, Difficulty::Beginner) => "초급",
            (Language::Ko, Difficulty::Intermediate) => "중급",
            (Language::Ko, Difficulty::Advanced) => "고급",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "🟢",
            Difficulty::Intermediate => "🟡",
            Difficulty::Advanced => "🔴",
        }
    }
}

/// A topic chosen for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub title: String,
    pub category: Category,
    pub difficulty: Difficulty,
}

/// Structured output of the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub topic: String,
    pub title: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub summary: String,
    pub tags: Vec<String>,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub id: i64,
    pub topic: String,
    pub title: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub summary: String,
    pub tags: Vec<String>,
    pub notion_page_id: Option<String>,
    pub notion_url: Option<String>,
    pub slack_ts: Option<String>,
    pub author: String,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub id: i64,
    pub time: ScheduleTime,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLog {
    pub id: i64,
    pub schedule_id: Option<i64>,
    pub content_id: Option<i64>,
    pub status: ExecutionStatus,
    pub attempt_count: u32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicRequest {
    pub id: i64,
    pub topic: String,
    pub requested_by: String,
    pub processed: bool,
    pub content_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_case_insensitively() {
        assert_eq!("Network".parse::<Category>(), Ok(Category::Network));
        assert_eq!(
            " data_structure ".parse::<Category>(),
            Ok(Category::DataStructure)
        );
        assert!("physics".parse::<Category>().is_err());
        assert_eq!(Difficulty::Advanced.to_string(), "advanced");
    }

    #[test]
    fn every_category_has_names_in_both_languages() {
        for category in Category::ALL {
            assert!(!category.display_name(Language::En).is_empty());
            assert!(!category.display_name(Language::Ko).is_empty());
        }
    }
}
