//! markup 문법 - 태그로 감싼 호출
//!
//! `<function_calls>` 블록 안의 `<invoke name="tool">` 요소 하나가 호출 하나다.
//! 인자는 세 가지 방식으로 줄 수 있고 섞어 써도 된다.
//!
//! ```text
//! <invoke name="read_file" path="a.txt"/>                       속성
//! <invoke name="read_file"><path>a.txt</path></invoke>          하위 요소
//! <invoke name="read_file">
//!   <parameter name="path">a.txt</parameter>                    parameter 요소
//! </invoke>
//! ```

use super::{ParseError, RawCall};
use regex::Regex;
use skein_foundation::CallDialect;
use std::sync::OnceLock;

const DIALECT: CallDialect = CallDialect::Markup;
const INVOKE: &str = "invoke";
const PARAMETER: &str = "parameter";

fn attribute_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([A-Za-z_][\w.\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok())
        .as_ref()
}

/// `<name` 의 태그 이름
fn element_name(element: &str) -> Option<&str> {
    let body = element.strip_prefix('<')?;
    let mut chars = body.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    let end = chars
        .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-')))
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    Some(&body[..end])
}

/// 블록 본문 (`<function_calls>`와 `</function_calls>` 사이) 파싱
pub(crate) fn parse(body: &str) -> Result<Vec<RawCall>, ParseError> {
    let mut calls = Vec::new();
    let mut rest = body;

    while let Some(start) = find_open_tag(rest, INVOKE) {
        let element = &rest[start..];
        let tag = open_tag(element, INVOKE)?;

        let mut attrs = attributes(tag.attrs);
        let name = take_attr(&mut attrs, "name")
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(ParseError::MissingName)?;

        if tag.self_closing {
            rest = &element[tag.len..];
        } else {
            let inner = &element[tag.len..];
            let close = format!("</{}>", INVOKE);
            let end = inner.find(&close).ok_or_else(|| ParseError::UnterminatedElement {
                element: INVOKE.to_string(),
            })?;
            attrs.extend(child_elements(&inner[..end])?);
            rest = &inner[end + close.len()..];
        }

        calls.push(RawCall::Markup {
            name,
            params: attrs,
        });
    }

    if calls.is_empty() {
        return Err(ParseError::EmptyBlock { dialect: "markup" });
    }
    Ok(calls)
}

/// 여는 태그 정보
struct OpenTag<'a> {
    /// 태그 이름 뒤의 속성 텍스트
    attrs: &'a str,
    self_closing: bool,
    /// `<`부터 `>`까지의 길이
    len: usize,
}

/// `<{name}` 뒤에 공백/`>`/`/`가 오는 위치 (`<invoked>` 같은 이름 제외)
fn find_open_tag(text: &str, name: &str) -> Option<usize> {
    let needle = format!("<{}", name);
    let mut offset = 0;
    while let Some(pos) = text[offset..].find(&needle) {
        let at = offset + pos;
        let next = text[at + needle.len()..].chars().next();
        match next {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => return Some(at),
            // 태그가 아직 끝나지 않음 → 여는 태그로 취급해서 unterminated로 보고
            None => return Some(at),
            _ => offset = at + needle.len(),
        }
    }
    None
}

fn open_tag<'a>(element: &'a str, name: &str) -> Result<OpenTag<'a>, ParseError> {
    let end = element.find('>').ok_or_else(|| ParseError::UnterminatedElement {
        element: name.to_string(),
    })?;
    let head = &element[1 + name.len()..end];
    let (attrs, self_closing) = match head.strip_suffix('/') {
        Some(attrs) => (attrs, true),
        None => (head, false),
    };
    Ok(OpenTag {
        attrs,
        self_closing,
        len: end + 1,
    })
}

fn attributes(text: &str) -> Vec<(String, String)> {
    let Some(re) = attribute_regex() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((key, unescape(value)))
        })
        .collect()
}

fn take_attr(attrs: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let index = attrs.iter().position(|(k, _)| k == key)?;
    Some(attrs.remove(index).1)
}

/// `<invoke>` 본문의 인자 요소들
fn child_elements(body: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut params = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find('<') {
        let element = &rest[start..];
        let tag_name = element_name(element)
            .map(str::to_string)
            .ok_or_else(|| {
                ParseError::malformed(
                    DIALECT,
                    format!("unexpected markup '{}'", snippet(element)),
                )
            })?;

        let tag = open_tag(element, &tag_name)?;
        let mut attrs = attributes(tag.attrs);

        let key = if tag_name == PARAMETER {
            take_attr(&mut attrs, "name").ok_or_else(|| {
                ParseError::malformed(DIALECT, "<parameter> element without a name")
            })?
        } else {
            tag_name.clone()
        };

        if tag.self_closing {
            params.push((key, String::new()));
            rest = &element[tag.len..];
            continue;
        }

        let inner = &element[tag.len..];
        let close = format!("</{}>", tag_name);
        let end = inner
            .find(&close)
            .ok_or(ParseError::UnterminatedElement { element: tag_name })?;
        params.push((key, unescape(trim_newlines(&inner[..end]))));
        rest = &inner[end + close.len()..];
    }

    Ok(params)
}

/// 값 앞뒤의 줄바꿈만 제거 (공백은 값의 일부)
fn trim_newlines(value: &str) -> &str {
    value.trim_matches(|c| c == '\n' || c == '\r')
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn snippet(text: &str) -> String {
    text.chars().take(24).collect()
}
