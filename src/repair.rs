//! Best-effort recovery of JSON from raw generator output.
//!
//! The generator is asked for strict JSON but routinely wraps it in prose,
//! markdown fences, or emits broken escapes and truncated arrays. Each repair
//! stage here is an independent pure function; `repair_json` runs them in
//! order and returns the first successful decode. Stages never compound:
//! every stage starts again from the stripped input.
//!
//! Stage order (strictest first):
//!   1. direct decode
//!   2. cleanup decode (control chars, smart quotes, trailing commas, escapes)
//!   3. balanced-span extraction (drop surrounding prose)
//!   4. truncation repair (close an unterminated structure)
//!   5. pattern reconstruction (quiz shapes only; last resort)

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::schema::Shape;

#[derive(Debug, Error)]
pub enum RepairError {
  /// Every stage failed. Carries the offending text for diagnostics.
  #[error("no repair stage produced valid JSON: {reason}")]
  Unrecoverable { reason: String, raw: String },
}

/// Run the repair cascade. `shape` only matters for the last stage, which is
/// specific to quiz-question arrays.
pub fn repair_json(raw: &str, shape: Shape) -> Result<Value, RepairError> {
  let stripped = strip_wrapping(raw);

  let first_err = match decode_direct(&stripped) {
    Ok(v) => return Ok(v),
    Err(e) => e.to_string(),
  };

  if let Ok(v) = decode_cleaned(&stripped) {
    debug!(target: "generation", "repair: cleanup decode succeeded");
    return Ok(v);
  }
  if let Ok(v) = decode_extracted(&stripped) {
    debug!(target: "generation", "repair: balanced-span extraction succeeded");
    return Ok(v);
  }
  if let Ok(v) = decode_truncated(&stripped) {
    debug!(target: "generation", "repair: truncation repair succeeded");
    return Ok(v);
  }
  if shape == Shape::QuizQuestions {
    if let Some(v) = reconstruct_questions(&stripped) {
      debug!(target: "generation", "repair: pattern reconstruction succeeded");
      return Ok(v);
    }
  }

  Err(RepairError::Unrecoverable { reason: first_err, raw: raw.to_string() })
}

/// Strip BOM, surrounding whitespace, and markdown code fences.
pub fn strip_wrapping(raw: &str) -> String {
  let mut s = raw.trim();
  s = s.strip_prefix('\u{feff}').unwrap_or(s).trim_start();
  if let Some(rest) = s.strip_prefix("```json") {
    s = rest;
  } else if let Some(rest) = s.strip_prefix("```") {
    s = rest;
  }
  s = s.strip_suffix("```").unwrap_or(s);
  s.trim().to_string()
}

/// Stage 1: decode the stripped text as-is.
pub fn decode_direct(text: &str) -> Result<Value, serde_json::Error> {
  serde_json::from_str(text)
}

/// Stage 2: scrub common syntactic damage, then decode.
pub fn decode_cleaned(text: &str) -> Result<Value, serde_json::Error> {
  let cleaned = clean_text(text);
  serde_json::from_str(&cleaned)
}

fn clean_text(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for ch in text.chars() {
    match ch {
      // Control characters other than the whitespace JSON tolerates.
      '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' => {}
      '\u{201c}' | '\u{201d}' => out.push('"'),
      '\u{2018}' | '\u{2019}' => out.push('\''),
      _ => out.push(ch),
    }
  }
  let out = fix_stray_backslashes(&out);
  strip_trailing_commas(&out)
}

/// Double any backslash that does not begin a valid JSON escape.
fn fix_stray_backslashes(text: &str) -> String {
  let bytes: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut i = 0;
  while i < bytes.len() {
    let c = bytes[i];
    if c == '\\' {
      match bytes.get(i + 1) {
        Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
          out.push('\\');
          out.push(bytes[i + 1]);
          i += 2;
          continue;
        }
        _ => {
          out.push('\\');
          out.push('\\');
          i += 1;
          continue;
        }
      }
    }
    out.push(c);
    i += 1;
  }
  out
}

/// Remove commas that directly precede a closing bracket (outside strings).
fn strip_trailing_commas(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut in_string = false;
  let mut escaped = false;
  for (i, &c) in chars.iter().enumerate() {
    if in_string {
      out.push(c);
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }
    match c {
      '"' => {
        in_string = true;
        out.push(c);
      }
      ',' => {
        // Lookahead past whitespace; drop the comma if a closer follows.
        let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
        if !matches!(next, Some(']') | Some('}')) {
          out.push(c);
        }
      }
      _ => out.push(c),
    }
  }
  out
}

/// Stage 3: extract the first balanced `[...]` or `{...}` span, ignoring
/// brackets inside string literals, and decode that span alone.
pub fn decode_extracted(text: &str) -> Result<Value, serde_json::Error> {
  match find_balanced_span(text) {
    Some(span) => serde_json::from_str(span),
    None => serde_json::from_str(text), // no span at all: surface a parse error
  }
}

fn find_balanced_span(text: &str) -> Option<&str> {
  let start = text.find(|c| c == '[' || c == '{')?;
  let bytes = text.as_bytes();
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for (i, &b) in bytes.iter().enumerate().skip(start) {
    let c = b as char;
    if in_string {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }
    match c {
      '"' => in_string = true,
      '[' | '{' => depth += 1,
      ']' | '}' => {
        depth = depth.saturating_sub(1);
        if depth == 0 {
          return Some(&text[start..=i]);
        }
      }
      _ => {}
    }
  }
  None
}

/// Stage 4: if the structure is unterminated (more opens than closes),
/// truncate at the last closing bracket and append the missing closers.
pub fn decode_truncated(text: &str) -> Result<Value, serde_json::Error> {
  let start = match text.find(|c| c == '[' || c == '{') {
    Some(i) => i,
    None => return serde_json::from_str(text),
  };
  let body = &text[start..];

  let last_close = match body.rfind(|c| c == ']' || c == '}') {
    Some(i) => i,
    None => return serde_json::from_str(body),
  };
  let mut candidate = body[..=last_close].to_string();

  // Re-scan the candidate to find which brackets are still open.
  let mut stack: Vec<char> = Vec::new();
  let mut in_string = false;
  let mut escaped = false;
  for c in candidate.chars() {
    if in_string {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }
    match c {
      '"' => in_string = true,
      '[' => stack.push(']'),
      '{' => stack.push('}'),
      ']' | '}' => {
        stack.pop();
      }
      _ => {}
    }
  }
  if in_string {
    candidate.push('"');
  }
  while let Some(closer) = stack.pop() {
    candidate.push(closer);
  }
  serde_json::from_str(&candidate)
}

// ---- Stage 5: quiz-specific pattern reconstruction ----

fn re_question() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#""question"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex"))
}

fn re_options() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#"(?s)"options"\s*:\s*\[(.*?)\]"#).expect("static regex"))
}

fn re_answer() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#""correct_answer"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex"))
}

fn re_explanation() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#""explanation"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex"))
}

fn re_difficulty() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#""difficulty"\s*:\s*"([^"]*)""#).expect("static regex"))
}

fn re_quoted() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("static regex"))
}

fn re_block_split() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\}\s*,?\s*\{").expect("static regex"))
}

fn unescape(s: &str) -> String {
  s.replace("\\\"", "\"").replace("\\n", "\n")
}

/// Stage 5: synthesize quiz question objects from text with no usable JSON.
/// Tries JSON-ish field scraping first, then label-anchored plain-text lines.
pub fn reconstruct_questions(text: &str) -> Option<Value> {
  if let Some(v) = scrape_jsonish_questions(text) {
    return Some(v);
  }
  scan_labeled_questions(text)
}

/// Pull question fields out of broken JSON with regexes, block by block.
fn scrape_jsonish_questions(text: &str) -> Option<Value> {
  let mut questions = Vec::new();

  for block in re_block_split().split(text) {
    let q = match re_question().captures(block) {
      Some(c) => unescape(&c[1]),
      None => continue,
    };
    let opts_raw = match re_options().captures(block) {
      Some(c) => c[1].to_string(),
      None => continue,
    };
    let answer = match re_answer().captures(block) {
      Some(c) => unescape(&c[1]),
      None => continue,
    };
    let options: Vec<String> =
      re_quoted().captures_iter(&opts_raw).map(|c| unescape(&c[1])).collect();
    if options.len() < 2 {
      continue;
    }

    // The answer must actually name an option; a case-insensitive match is
    // canonicalized to the option's spelling.
    let answer = if options.iter().any(|o| o == &answer) {
      answer
    } else {
      match options.iter().find(|o| o.trim().eq_ignore_ascii_case(answer.trim())) {
        Some(o) => o.clone(),
        None => continue,
      }
    };

    let explanation = re_explanation()
      .captures(block)
      .map(|c| unescape(&c[1]))
      .unwrap_or_else(|| "No explanation provided.".to_string());
    let difficulty = re_difficulty()
      .captures(block)
      .map(|c| c[1].to_string())
      .unwrap_or_else(|| "medium".to_string());

    questions.push(json!({
      "question": q,
      "options": options,
      "correct_answer": answer,
      "difficulty": difficulty,
      "explanation": explanation,
    }));
  }

  if questions.is_empty() { None } else { Some(Value::Array(questions)) }
}

/// Parse plain-text blocks of the form:
///   Question: ...
///   A) ... / B) ... / C) ... / D) ...
///   Correct: ...
///   Explanation: ...
fn scan_labeled_questions(text: &str) -> Option<Value> {
  let mut questions = Vec::new();

  let mut question: Option<String> = None;
  let mut options: Vec<String> = Vec::new();
  let mut answer: Option<String> = None;
  let mut explanation: Option<String> = None;

  let mut flush = |question: &mut Option<String>,
                   options: &mut Vec<String>,
                   answer: &mut Option<String>,
                   explanation: &mut Option<String>,
                   questions: &mut Vec<Value>| {
    if let (Some(q), Some(a)) = (question.take(), answer.take()) {
      if options.len() == 4 {
        // "Correct: B" style answers refer to an option letter.
        let resolved = match a.trim() {
          letter @ ("A" | "B" | "C" | "D") => {
            let idx = (letter.as_bytes()[0] - b'A') as usize;
            options.get(idx).cloned()
          }
          other => options
            .iter()
            .find(|o| o.trim().eq_ignore_ascii_case(other))
            .cloned(),
        };
        if let Some(correct) = resolved {
          questions.push(json!({
            "question": q,
            "options": options.clone(),
            "correct_answer": correct,
            "difficulty": "medium",
            "explanation": explanation.take().unwrap_or_else(|| "No explanation provided.".to_string()),
          }));
        }
      }
    }
    options.clear();
    *explanation = None;
  };

  for line in text.lines() {
    let line = line.trim();
    if let Some(rest) = strip_label(line, "Question:") {
      flush(&mut question, &mut options, &mut answer, &mut explanation, &mut questions);
      question = Some(rest.to_string());
    } else if let Some(rest) = option_line(line) {
      options.push(rest.to_string());
    } else if let Some(rest) = strip_label(line, "Correct:") {
      answer = Some(rest.to_string());
    } else if let Some(rest) = strip_label(line, "Explanation:") {
      explanation = Some(rest.to_string());
    }
  }
  flush(&mut question, &mut options, &mut answer, &mut explanation, &mut questions);

  if questions.is_empty() { None } else { Some(Value::Array(questions)) }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
  let lower = line.to_lowercase();
  if lower.starts_with(&label.to_lowercase()) {
    Some(line[label.len()..].trim())
  } else {
    None
  }
}

fn option_line(line: &str) -> Option<&str> {
  let mut chars = line.chars();
  let letter = chars.next()?;
  if !matches!(letter, 'A'..='D') {
    return None;
  }
  let sep = chars.next()?;
  if sep != ')' && sep != '.' && sep != ':' {
    return None;
  }
  Some(line[2..].trim())
}
