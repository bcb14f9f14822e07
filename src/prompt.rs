use crate::search::{Match, format_passages};
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "너는 유란시아서 신학과 교육에 능통한 학자이다.";
pub const NO_PASSAGES_PLACEHOLDER: &str = "관련 구절을 찾지 못했습니다.";
pub const SLIDE_COUNT: usize = 5;

/// A two-message chat request: fixed system persona plus the filled-in
/// instruction template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(term: &str, matches: &[Match]) -> ChatPrompt {
    let passages = format_passages(matches);
    let joined = if passages.is_empty() {
        NO_PASSAGES_PLACEHOLDER.to_string()
    } else {
        passages.join("\n")
    };
    let user = format!(
        r#"당신은 유란시아서를 연구하는 신학자입니다.

주제: "{term}"

아래는 이 주제와 관련 있다고 판단되는 유란시아서 본문입니다.

---

## 1부. 신학적 보고서 (700~1000자)
- 이 주제의 유란시아적 의미
- 신성/우주론적 중요성
- 아버지, 최극존재, 생각조율자와의 관계
- 인간 상승 체험과의 연결
- 오늘의 신앙과 삶에 주는 교훈

## 2부. 5장 슬라이드 개요
각 슬라이드는
- 제목 1줄
- 핵심 포인트 3~5개
- `발표자 노트:` 300~500자

아래 형식으로 출력하세요:

# 슬라이드 1: ...
- ...
발표자 노트: ...

# 슬라이드 2: ...
...

---

### 참고 본문:
{passages}
"#,
        term = term.trim(),
        passages = joined,
    );
    ChatPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}
