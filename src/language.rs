//! Target-language enforcement for the narrative parts of a message.
//!
//! Detection is a local Unicode-script heuristic, deliberately cheap and
//! honest about its limits: it answers yes, no, or uncertain. Only a
//! definite "yes" skips the corrective model call; "no" and "uncertain"
//! both fall through to the model, which is the actual judge — the
//! heuristic exists to save a round trip, never to guess.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::{
   chat::ChatMessage,
   config::PipelineConfig,
   error::Result,
   executor::StructuredCallExecutor,
   schema::RequestKind,
   strict, templates,
};

/// Languages the script heuristic knows how to judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
   En,
   Zh,
   Ja,
   Ko,
   De,
   Fr,
   Es,
   Pt,
   Ru,
   It,
   /// Anything else: always judged uncertain, the model decides nothing.
   Other,
}

/// Ternary detection verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
   Yes,
   No,
   Uncertain,
}

/// Map a user-supplied language tag to a [`Lang`].
///
/// Accepts ISO 639-1 codes (with or without a region subtag), English names,
/// and the language's own name for itself. Case-insensitive.
pub fn normalize_language(tag: &str) -> Lang {
   let lowered = tag.trim().to_lowercase();
   // "zh-CN", "pt_BR" and friends all reduce to the base language
   let base = lowered
      .split(['-', '_'])
      .next()
      .unwrap_or(&lowered)
      .to_string();

   match base.as_str() {
      "en" | "eng" | "english" => Lang::En,
      "zh" | "chinese" | "mandarin" | "中文" | "汉语" | "漢語" => Lang::Zh,
      "ja" | "jp" | "japanese" | "日本語" => Lang::Ja,
      "ko" | "korean" | "한국어" => Lang::Ko,
      "de" | "german" | "deutsch" => Lang::De,
      "fr" | "french" | "français" | "francais" => Lang::Fr,
      "es" | "spanish" | "español" | "espanol" | "castellano" => Lang::Es,
      "pt" | "portuguese" | "português" | "portugues" => Lang::Pt,
      "ru" | "russian" | "русский" => Lang::Ru,
      "it" | "italian" | "italiano" => Lang::It,
      _ => Lang::Other,
   }
}

/// Letter counts per Unicode script over a piece of text.
#[derive(Debug, Clone, Copy, Default)]
struct ScriptCounts {
   ascii_alpha:  u32,
   latin_accent: u32,
   cjk:          u32,
   hiragana:     u32,
   katakana:     u32,
   hangul:       u32,
   cyrillic:     u32,
}

impl ScriptCounts {
   fn count(text: &str) -> Self {
      let mut counts = Self::default();
      for ch in text.chars() {
         match ch {
            'a'..='z' | 'A'..='Z' => counts.ascii_alpha += 1,
            '\u{00C0}'..='\u{00FF}' if ch != '×' && ch != '÷' => counts.latin_accent += 1,
            '\u{0100}'..='\u{017F}' => counts.latin_accent += 1,
            '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' => counts.cjk += 1,
            '\u{3040}'..='\u{309F}' => counts.hiragana += 1,
            '\u{30A0}'..='\u{30FF}' => counts.katakana += 1,
            '\u{1100}'..='\u{11FF}' | '\u{AC00}'..='\u{D7AF}' => counts.hangul += 1,
            '\u{0400}'..='\u{04FF}' => counts.cyrillic += 1,
            _ => {},
         }
      }
      counts
   }

   const fn kana(&self) -> u32 {
      self.hiragana + self.katakana
   }

   const fn latin(&self) -> u32 {
      self.ascii_alpha + self.latin_accent
   }

   const fn non_latin(&self) -> u32 {
      self.cjk + self.kana() + self.hangul + self.cyrillic
   }

   const fn total(&self) -> u32 {
      self.latin() + self.non_latin()
   }
}

/// Accented characters that mark one Latin language over another, with
/// weights. Shared accents score low for every candidate; characters unique
/// to one orthography score high.
const LATIN_MARKERS: &[(char, &[(Lang, u32)])] = &[
   ('ß', &[(Lang::De, 3)]),
   ('ä', &[(Lang::De, 2)]),
   ('ö', &[(Lang::De, 2)]),
   ('ü', &[(Lang::De, 2)]),
   ('œ', &[(Lang::Fr, 3)]),
   ('ç', &[(Lang::Fr, 2), (Lang::Pt, 2)]),
   ('ê', &[(Lang::Fr, 2)]),
   ('î', &[(Lang::Fr, 2)]),
   ('û', &[(Lang::Fr, 2)]),
   ('ë', &[(Lang::Fr, 1)]),
   ('ï', &[(Lang::Fr, 1)]),
   ('â', &[(Lang::Fr, 1), (Lang::Pt, 1)]),
   ('ô', &[(Lang::Fr, 1), (Lang::Pt, 1)]),
   ('è', &[(Lang::Fr, 2), (Lang::It, 2)]),
   ('à', &[(Lang::Fr, 1), (Lang::It, 2), (Lang::Pt, 1)]),
   ('ù', &[(Lang::Fr, 1), (Lang::It, 2)]),
   ('ì', &[(Lang::It, 3)]),
   ('ò', &[(Lang::It, 2)]),
   ('ñ', &[(Lang::Es, 3)]),
   ('¡', &[(Lang::Es, 3)]),
   ('¿', &[(Lang::Es, 3)]),
   ('á', &[(Lang::Es, 1), (Lang::Pt, 1)]),
   ('í', &[(Lang::Es, 1), (Lang::Pt, 1)]),
   ('ó', &[(Lang::Es, 1), (Lang::Pt, 1)]),
   ('ú', &[(Lang::Es, 1), (Lang::Pt, 1)]),
   ('é', &[(Lang::Fr, 1), (Lang::Es, 1), (Lang::Pt, 1)]),
   ('ã', &[(Lang::Pt, 3)]),
   ('õ', &[(Lang::Pt, 3)]),
];

const LATIN_LANGS: &[Lang] = &[Lang::De, Lang::Fr, Lang::Es, Lang::Pt, Lang::It];

fn latin_scores(text: &str) -> Vec<(Lang, u32)> {
   let mut scores: Vec<(Lang, u32)> = LATIN_LANGS.iter().map(|&l| (l, 0)).collect();
   for ch in text.chars().flat_map(char::to_lowercase) {
      if let Some((_, weights)) = LATIN_MARKERS.iter().find(|(marker, _)| *marker == ch) {
         for (lang, weight) in *weights {
            if let Some(entry) = scores.iter_mut().find(|(l, _)| l == lang) {
               entry.1 += weight;
            }
         }
      }
   }
   scores
}

/// The parts of a message a human reads as prose: the header description and
/// the body with bullet markers stripped. Footer lines, the type/scope
/// prefix, and blank lines are excluded.
pub fn narrative_text(message: &str) -> String {
   let mut parts = Vec::new();
   let mut lines = message.lines();

   if let Some(header) = lines.next() {
      let description = header
         .split_once(": ")
         .map_or(header, |(_, d)| d);
      if !description.trim().is_empty() {
         parts.push(description.trim().to_string());
      }
   }

   for line in lines {
      let trimmed = line.trim();
      if trimmed.is_empty() || is_footer_line(trimmed) {
         continue;
      }
      let stripped = trimmed
         .trim_start_matches(['-', '*', '•'])
         .trim_start();
      parts.push(stripped.to_string());
   }

   parts.join("\n")
}

fn is_footer_line(line: &str) -> bool {
   if line.starts_with("BREAKING CHANGE:") || line.starts_with("BREAKING-CHANGE:") {
      return true;
   }
   let Some((token, rest)) = line.split_once(':') else {
      return false;
   };
   // Token: value, token like "Refs" or "Signed-off-by"
   !token.is_empty()
      && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
      && token.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
      && rest.starts_with(' ')
      && !token.contains(' ')
}

/// Judge whether `text` reads as `lang`.
///
/// `margin` is how many marker points one Latin language must lead the
/// runner-up by before the heuristic claims a definite answer.
pub fn judge(lang: Lang, text: &str, margin: u32) -> Verdict {
   // NFC first, so decomposed accents count as single marker chars
   let text: String = text.nfc().collect();
   let counts = ScriptCounts::count(&text);

   // Too few letters to say anything
   if counts.total() < 4 {
      return Verdict::Uncertain;
   }

   match lang {
      Lang::Other => Verdict::Uncertain,

      Lang::En => {
         if counts.non_latin() > 0 {
            if counts.non_latin() >= counts.latin() {
               Verdict::No
            } else {
               Verdict::Uncertain
            }
         } else if counts.latin_accent == 0 {
            Verdict::Yes
         } else {
            // Accented Latin text: English or one of its neighbours?
            let best = latin_scores(&text)
               .into_iter()
               .map(|(_, s)| s)
               .max()
               .unwrap_or(0);
            if best >= margin { Verdict::No } else { Verdict::Uncertain }
         }
      },

      Lang::Zh => {
         if counts.kana() > 0 || counts.hangul > 0 {
            Verdict::No
         } else if counts.cjk >= 2 {
            Verdict::Yes
         } else if counts.cjk > 0 {
            Verdict::Uncertain
         } else {
            Verdict::No
         }
      },

      Lang::Ja => {
         if counts.kana() > 0 {
            Verdict::Yes
         } else if counts.cjk > 0 {
            // Kanji-only text could be Japanese or Chinese
            Verdict::Uncertain
         } else {
            Verdict::No
         }
      },

      Lang::Ko => {
         if counts.hangul > 0 {
            Verdict::Yes
         } else if counts.cjk > 0 {
            Verdict::Uncertain
         } else {
            Verdict::No
         }
      },

      Lang::Ru => {
         if counts.cyrillic >= 2 && counts.cjk + counts.kana() + counts.hangul == 0 {
            Verdict::Yes
         } else if counts.cyrillic > 0 {
            Verdict::Uncertain
         } else {
            Verdict::No
         }
      },

      Lang::De | Lang::Fr | Lang::Es | Lang::Pt | Lang::It => {
         if counts.non_latin() >= counts.latin() {
            return Verdict::No;
         }
         let scores = latin_scores(&text);
         let own = scores
            .iter()
            .find(|(l, _)| *l == lang)
            .map_or(0, |(_, s)| *s);
         let best_other = scores
            .iter()
            .filter(|(l, _)| *l != lang)
            .map(|(_, s)| *s)
            .max()
            .unwrap_or(0);
         if own >= best_other + margin {
            Verdict::Yes
         } else if best_other >= own + margin {
            Verdict::No
         } else {
            // Accent-free Romance text is indistinguishable from English
            Verdict::Uncertain
         }
      },
   }
}

/// Outcome of the language enforcement stage.
#[derive(Debug, Clone)]
pub struct LanguageOutcome {
   pub commit_message: String,
   pub verdict:        Verdict,
   pub rewritten:      bool,
}

/// Enforce the configured target language on `message`.
///
/// No target configured, or a "yes" verdict, returns the message unchanged
/// with zero model calls. Anything else spends exactly one fix call; if the
/// call fails, or the rewrite breaks the header, the original message goes
/// through (fail-open).
pub fn enforce_language(
   executor: &StructuredCallExecutor,
   config: &PipelineConfig,
   message: &str,
) -> Result<LanguageOutcome> {
   let Some(target) = config.target_language.as_deref() else {
      return Ok(LanguageOutcome {
         commit_message: message.to_string(),
         verdict:        Verdict::Yes,
         rewritten:      false,
      });
   };

   let lang = normalize_language(target);
   let verdict = judge(lang, &narrative_text(message), config.latin_margin);

   if verdict == Verdict::Yes {
      return Ok(LanguageOutcome {
         commit_message: message.to_string(),
         verdict,
         rewritten: false,
      });
   }

   let conversation = vec![
      ChatMessage::system(templates::render_system_prompt(Some(target))?),
      ChatMessage::user(templates::render_language_fix_prompt(message, target)?),
   ];

   match executor.execute(&RequestKind::LanguageFix, &conversation) {
      Ok(value) => {
         let fixed = value
            .get("commit_message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
         // A rewrite that breaks the header is worse than the wrong language
         if !fixed.is_empty() && strict::check_header(&fixed).ok {
            Ok(LanguageOutcome { commit_message: fixed, verdict, rewritten: true })
         } else {
            Ok(LanguageOutcome {
               commit_message: message.to_string(),
               verdict,
               rewritten: false,
            })
         }
      },
      Err(e) if e.is_cancelled() => Err(e),
      Err(_) => Ok(LanguageOutcome {
         commit_message: message.to_string(),
         verdict,
         rewritten: false,
      }),
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      executor::CancelToken,
      testing::{CloneArc, MockBackend},
   };

   #[test]
   fn test_normalize_language_aliases() {
      assert_eq!(normalize_language("en"), Lang::En);
      assert_eq!(normalize_language("English"), Lang::En);
      assert_eq!(normalize_language("zh-CN"), Lang::Zh);
      assert_eq!(normalize_language("中文"), Lang::Zh);
      assert_eq!(normalize_language("日本語"), Lang::Ja);
      assert_eq!(normalize_language("한국어"), Lang::Ko);
      assert_eq!(normalize_language("Deutsch"), Lang::De);
      assert_eq!(normalize_language("français"), Lang::Fr);
      assert_eq!(normalize_language("pt_BR"), Lang::Pt);
      assert_eq!(normalize_language("русский"), Lang::Ru);
      assert_eq!(normalize_language("klingon"), Lang::Other);
   }

   #[test]
   fn test_narrative_excludes_prefix_footers_and_bullets() {
      let message = "feat(api): add batch endpoint\n\n\
                     - supports up to 100 jobs\n\
                     * validates input first\n\n\
                     Refs: #42\n\
                     BREAKING CHANGE: removes single submit";
      let narrative = narrative_text(message);
      assert!(narrative.contains("add batch endpoint"));
      assert!(narrative.contains("supports up to 100 jobs"));
      assert!(narrative.contains("validates input first"));
      assert!(!narrative.contains("feat"));
      assert!(!narrative.contains("Refs"));
      assert!(!narrative.contains("removes single submit"));
   }

   #[test]
   fn test_judge_english() {
      assert_eq!(Verdict::Yes, judge(Lang::En, "add batch endpoint for jobs", 2));
      assert_eq!(Verdict::No, judge(Lang::En, "添加批量任务接口", 2));
      // Accent-free short text in another Latin language passes as English
      assert_eq!(Verdict::Yes, judge(Lang::En, "corrige la gestion", 2));
   }

   #[test]
   fn test_judge_cjk_languages() {
      assert_eq!(Verdict::Yes, judge(Lang::Zh, "添加批量任务接口", 2));
      assert_eq!(Verdict::No, judge(Lang::Zh, "バッチ処理を追加する", 2));
      assert_eq!(Verdict::No, judge(Lang::Zh, "add batch endpoint now", 2));

      assert_eq!(Verdict::Yes, judge(Lang::Ja, "バッチ処理を追加する", 2));
      // Kanji with no kana could be either language
      assert_eq!(Verdict::Uncertain, judge(Lang::Ja, "追加批量接口", 2));

      assert_eq!(Verdict::Yes, judge(Lang::Ko, "배치 작업 지원 추가", 2));
      assert_eq!(Verdict::No, judge(Lang::Ko, "add batch endpoint now", 2));
   }

   #[test]
   fn test_judge_cyrillic() {
      assert_eq!(Verdict::Yes, judge(Lang::Ru, "добавить пакетную обработку", 2));
      assert_eq!(Verdict::No, judge(Lang::Ru, "add batch endpoint now", 2));
   }

   #[test]
   fn test_judge_latin_languages_by_markers() {
      assert_eq!(Verdict::Yes, judge(Lang::Es, "añadir compatibilidad con señales", 2));
      assert_eq!(Verdict::Yes, judge(Lang::De, "unterstützung für größere dateien", 2));
      assert_eq!(Verdict::Yes, judge(Lang::Pt, "adicionar suporte à paginação", 2));
      // Spanish markers against a French target
      assert_eq!(Verdict::No, judge(Lang::Fr, "añadir compatibilidad con señales", 2));
      // No accents at all: indistinguishable
      assert_eq!(Verdict::Uncertain, judge(Lang::Fr, "corrige la gestion des erreurs", 2));
   }

   #[test]
   fn test_judge_short_text_uncertain() {
      assert_eq!(Verdict::Uncertain, judge(Lang::En, "ok", 2));
   }

   #[test]
   fn test_wider_margin_weakens_claims() {
      let text = "è già la gestione corretta"; // Italian markers, Spanish target
      assert_eq!(Verdict::No, judge(Lang::Es, text, 1));
      assert_eq!(Verdict::Uncertain, judge(Lang::Es, text, 5));
   }

   fn config_with_target(target: &str) -> PipelineConfig {
      PipelineConfig {
         target_language: Some(target.to_string()),
         ..PipelineConfig::default()
      }
   }

   #[test]
   fn test_enforce_no_target_makes_no_calls() {
      let backend = MockBackend::from_texts(vec!["{}"]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());

      let out =
         enforce_language(&executor, &PipelineConfig::default(), "feat: add endpoint")
            .unwrap();
      assert_eq!(out.commit_message, "feat: add endpoint");
      assert!(!out.rewritten);
      assert_eq!(backend.call_count(), 0);
   }

   #[test]
   fn test_enforce_matching_language_makes_no_calls() {
      let backend = MockBackend::from_texts(vec!["{}"]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());

      let out = enforce_language(
         &executor,
         &config_with_target("en"),
         "feat: add batch endpoint for queued jobs",
      )
      .unwrap();
      assert_eq!(out.verdict, Verdict::Yes);
      assert_eq!(backend.call_count(), 0);
   }

   #[test]
   fn test_enforce_compliant_chinese_is_idempotent() {
      let backend = MockBackend::from_texts(vec!["{}"]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());
      let config = config_with_target("zh");

      let message = "feat: 添加批量任务接口";
      let first = enforce_language(&executor, &config, message).unwrap();
      assert_eq!(first.verdict, Verdict::Yes);
      assert_eq!(first.commit_message, message);

      // Same verdict, still no network call on a second run
      let second = enforce_language(&executor, &config, &first.commit_message).unwrap();
      assert_eq!(second.verdict, Verdict::Yes);
      assert_eq!(backend.call_count(), 0);
   }

   #[test]
   fn test_enforce_uncertain_falls_through_to_model() {
      // Accent-free Romance text: the heuristic cannot decide, the model can
      let reply = r#"{"commit_message": "fix: corrige la gestion des erreurs"}"#;
      let backend = MockBackend::from_texts(vec![reply]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());

      let out = enforce_language(
         &executor,
         &config_with_target("fr"),
         "fix: corrige la gestion des erreurs",
      )
      .unwrap();
      assert_eq!(out.verdict, Verdict::Uncertain);
      assert_eq!(backend.call_count(), 1);
   }

   #[test]
   fn test_enforce_wrong_language_spends_one_call() {
      let reply = r#"{"commit_message": "feat: add batch endpoint"}"#;
      let backend = MockBackend::from_texts(vec![reply]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());

      let out = enforce_language(
         &executor,
         &config_with_target("en"),
         "feat: 添加批量任务接口",
      )
      .unwrap();
      assert_eq!(out.verdict, Verdict::No);
      assert!(out.rewritten);
      assert_eq!(out.commit_message, "feat: add batch endpoint");
      assert_eq!(backend.call_count(), 1);
   }

   #[test]
   fn test_enforce_failed_fix_keeps_original() {
      let backend = MockBackend::from_texts(vec!["bad", "bad"]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());

      let original = "feat: 添加批量任务接口";
      let out =
         enforce_language(&executor, &config_with_target("en"), original).unwrap();
      assert_eq!(out.commit_message, original);
      assert!(!out.rewritten);
   }

   #[test]
   fn test_enforce_header_breaking_fix_keeps_original() {
      let reply = r#"{"commit_message": "No Longer A Valid Header"}"#;
      let backend = MockBackend::from_texts(vec![reply]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new());

      let original = "feat: 添加批量任务接口";
      let out =
         enforce_language(&executor, &config_with_target("en"), original).unwrap();
      assert_eq!(out.commit_message, original);
      assert!(!out.rewritten);
   }
}
