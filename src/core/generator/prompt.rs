use crate::core::domain::{Language, Topic};

const PROMPT_EN: &str = r#"You are a technical writer who explains computer science to working developers clearly and concisely.

## Request
Write a short summary for developers on the following topic.

**Topic:** {topic}
**Category:** {category}
**Difficulty:** {difficulty}

## Output format
Respond with JSON in exactly this shape and nothing else:

```json
{
    "title": "Topic title",
    "summary": "Core summary (3-5 sentences, under 300 characters)",
    "tags": ["tag1", "tag2", "tag3"]
}
```

## Guidelines
- The summary is posted to Slack and Notion as-is: 3-5 sentences covering the key idea and why it matters.
- 3-5 tags, at least one of them about the category.
- Beginner: basics in plain words. Intermediate: practical use with proper terminology. Advanced: internals and trade-offs.
"#;

const PROMPT_KO: &str = r#"당신은 CS 지식을 개발자에게 쉽고 명확하게 설명하는 기술 콘텐츠 작성자입니다.

## 작성 요청
다음 주제에 대해 개발자를 위한 요약 콘텐츠를 작성해주세요.

**주제:** {topic}
**카테고리:** {category}
**난이도:** {difficulty}

## 출력 형식
반드시 아래 JSON 형식으로만 출력하세요. JSON 외의 텍스트는 포함하지 마세요.

```json
{
    "title": "주제 제목",
    "summary": "핵심 요약 (3-5문장, 300자 이내)",
    "tags": ["태그1", "태그2", "태그3"]
}
```

## 작성 가이드라인
- 요약은 Slack과 Notion에 그대로 게시됩니다. 3-5문장으로 핵심 개념과 중요성을 전달하세요.
- 태그는 3-5개, 카테고리 관련 태그를 1개 이상 포함하세요.
- 초급: 기본 개념과 쉬운 용어. 중급: 실무 적용 중심. 고급: 심화 내용과 트레이드오프.
"#;

pub fn build_prompt(topic: &Topic, language: Language) -> String {
    let template = match language {
        Language::En => PROMPT_EN,
        Language::Ko => PROMPT_KO,
    };
    template
        .replace("{topic}", &topic.title)
        .replace("{category}", topic.category.display_name(language))
        .replace("{difficulty}", topic.difficulty.display_name(language))
}
