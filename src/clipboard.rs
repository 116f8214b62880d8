use crate::ocr::NO_TEXT_PLACEHOLDER;
use anyhow::Result;

#[derive(Debug, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    NothingToCopy,
    Failed,
}

/// The text a copy would place on the clipboard, if any.
pub fn copyable(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() || text == NO_TEXT_PLACEHOLDER {
        None
    } else {
        Some(text)
    }
}

pub fn copy_text(text: &str) -> CopyOutcome {
    copy_with(text, write_clipboard_string)
}

/// Copy policy with the clipboard writer injected.
pub fn copy_with(text: &str, write: impl FnOnce(&str) -> Result<()>) -> CopyOutcome {
    let Some(text) = copyable(text) else {
        return CopyOutcome::NothingToCopy;
    };
    match write(text) {
        Ok(()) => {
            log::info!("Copied {} chars to clipboard", text.len());
            CopyOutcome::Copied
        }
        Err(e) => {
            log::error!("Clipboard write failed: {:#}", e);
            CopyOutcome::Failed
        }
    }
}

pub fn write_clipboard_string(s: &str) -> Result<()> {
    #[cfg(windows)]
    {
        clipboard_win::set_clipboard_string(s)
            .map_err(|e| anyhow::anyhow!("clipboard: {}", e))
    }
    #[cfg(not(windows))]
    {
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(s)?;
        Ok(())
    }
}
