//! Backend selection policy.
//!
//! `auto` prefers the live backend when the host can run it and falls back
//! to the in-memory backend. `word` and `docx` force one backend.

use tracing::{info, warn};

use crate::core::rules::EnginePreference;
use crate::engine::docx::DocxEngine;
use crate::engine::live::{LiveEngine, LiveOptions};
use crate::engine::{Engine, EngineResult};
use crate::error::FormatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOptions {
    pub live: LiveOptions,
    /// Only try the live backend on Windows hosts.
    pub require_windows: bool,
}

/// Build the engine `preference` asks for.
pub fn select_engine(
    preference: EnginePreference,
    options: &SelectionOptions,
) -> Result<Box<dyn Engine>, FormatError> {
    select_with(preference, options, cfg!(windows), LiveEngine::spawn)
}

/// Selection with the host check and live constructor injected.
pub fn select_with<L>(
    preference: EnginePreference,
    options: &SelectionOptions,
    on_windows: bool,
    spawn_live: impl FnOnce(&LiveOptions) -> EngineResult<L>,
) -> Result<Box<dyn Engine>, FormatError>
where
    L: Engine + 'static,
{
    let mut reasons = Vec::new();

    if matches!(preference, EnginePreference::Auto | EnginePreference::Word) {
        if options.require_windows && !on_windows {
            reasons.push("word: live automation needs a Windows host".to_string());
        } else {
            match spawn_live(&options.live) {
                Ok(engine) => {
                    info!(engine = engine.name(), "selected live automation backend");
                    return Ok(Box::new(engine));
                }
                Err(err) => reasons.push(format!("word: {err}")),
            }
        }
        if preference == EnginePreference::Word {
            return Err(FormatError::EngineUnavailable(reasons.join("; ")));
        }
        for reason in &reasons {
            warn!(reason = %reason, "live backend unavailable, falling back to docx");
        }
    }

    let engine = DocxEngine::new();
    info!(engine = engine.name(), "selected in-memory docx backend");
    Ok(Box::new(engine))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::EngineError;

    fn options(require_windows: bool) -> SelectionOptions {
        SelectionOptions {
            live: LiveOptions {
                command: vec!["word-bridge".to_string()],
                shutdown_grace: Duration::from_secs(1),
            },
            require_windows,
        }
    }

    fn refuse(_: &LiveOptions) -> EngineResult<DocxEngine> {
        Err(EngineError::Unavailable("spawn word-bridge: not found".to_string()))
    }

    #[test]
    fn auto_falls_back_to_docx() {
        let engine = select_with(EnginePreference::Auto, &options(true), false, refuse).expect("engine");
        assert_eq!(engine.name(), "docx");
        let engine = select_with(EnginePreference::Auto, &options(false), false, refuse).expect("engine");
        assert_eq!(engine.name(), "docx");
    }

    #[test]
    fn auto_prefers_live_when_it_starts() {
        // Any engine stands in for the live one here.
        let engine = select_with(EnginePreference::Auto, &options(false), false, |_| {
            Ok(crate::test_support::RecordingEngine::new("word"))
        })
        .expect("engine");
        assert_eq!(engine.name(), "word");
    }

    #[test]
    fn forced_word_reports_every_reason() {
        let err = select_with(EnginePreference::Word, &options(true), false, refuse).err().expect("word");
        match err {
            FormatError::EngineUnavailable(message) => assert!(message.contains("Windows")),
            other => panic!("unexpected error: {other}"),
        }

        let err = select_with(EnginePreference::Word, &options(false), true, refuse).err().expect("word");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn forced_docx_never_spawns() {
        let engine = select_with(EnginePreference::Docx, &options(false), true, |_| -> EngineResult<DocxEngine> {
            panic!("live backend must not be tried")
        })
        .expect("engine");
        assert_eq!(engine.name(), "docx");
    }
}
