//! System clipboard glue (arboard)
//!
//! arboard has no change notifications and no MIME listing, so:
//! - [`ChangePoller`] polls a content signature on a background thread and
//!   posts [`LoopEvent::ClipboardChanged`] into the event loop. It never
//!   touches the history store.
//! - [`ArboardSource`] derives the advertised formats by probing text and
//!   image content, and delivers reads as [`LoopEvent::ReadCompleted`] so
//!   the continuation runs on a later loop iteration.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arboard::{Clipboard, ImageData};
use tracing::{debug, info, warn};

use super::capture::{
    parse_uri_list, uri_list_body, ClipboardSource, ContentClass, ReadPayload, ReadTicket,
    RestoreContent, MIME_PNG, MIME_TEXT, MIME_URI_LIST,
};
use super::hasher::{hash_file_uris, hash_text};
use super::image_cache::ClipImage;
use crate::daemon::LoopEvent;
use crate::error::{ClipNoteError, Result};

impl From<arboard::Error> for ClipNoteError {
    fn from(e: arboard::Error) -> Self {
        ClipNoteError::Clipboard(e.to_string())
    }
}

/// Text that is entirely a `text/uri-list` of file URIs
fn looks_like_uri_list(text: &str) -> bool {
    let mut meaningful = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .peekable();
    meaningful.peek().is_some() && meaningful.all(|line| line.starts_with("file://"))
}

fn to_clip_image(data: ImageData<'_>) -> Result<ClipImage> {
    let width = u32::try_from(data.width)
        .map_err(|_| ClipNoteError::Clipboard("image too wide".to_string()))?;
    let height = u32::try_from(data.height)
        .map_err(|_| ClipNoteError::Clipboard("image too tall".to_string()))?;
    Ok(ClipImage::new(width, height, data.bytes.into_owned()))
}

pub struct ArboardSource {
    clipboard: Clipboard,
    events: Sender<LoopEvent>,
}

impl ArboardSource {
    pub fn new(events: Sender<LoopEvent>) -> Result<Self> {
        Ok(Self {
            clipboard: Clipboard::new()?,
            events,
        })
    }

    fn read(&mut self, class: ContentClass) -> Result<ReadPayload> {
        match class {
            ContentClass::Text => Ok(ReadPayload::Text(self.clipboard.get_text()?)),
            ContentClass::Files => Ok(ReadPayload::UriList(self.clipboard.get_text()?)),
            ContentClass::Image => Ok(ReadPayload::Image(to_clip_image(
                self.clipboard.get_image()?,
            )?)),
        }
    }
}

impl ClipboardSource for ArboardSource {
    fn formats(&mut self) -> Vec<String> {
        let mut formats = Vec::new();
        if let Ok(text) = self.clipboard.get_text() {
            if looks_like_uri_list(&text) {
                formats.push(MIME_URI_LIST.to_string());
            }
            formats.push(MIME_TEXT.to_string());
        }
        if self.clipboard.get_image().is_ok() {
            formats.push(MIME_PNG.to_string());
        }
        formats
    }

    fn request_read(&mut self, ticket: ReadTicket, class: ContentClass) {
        let result = self.read(class);
        if self
            .events
            .send(LoopEvent::ReadCompleted { ticket, result })
            .is_err()
        {
            debug!("Event loop gone, dropping clipboard read");
        }
    }

    fn write(&mut self, content: RestoreContent) -> Result<()> {
        match content {
            RestoreContent::Text(text) => self.clipboard.set_text(text)?,
            RestoreContent::Image(image) => self.clipboard.set_image(ImageData {
                width: image.width as usize,
                height: image.height as usize,
                bytes: Cow::Owned(image.rgba),
            })?,
            // TODO: advertise text/uri-list once arboard exposes custom MIME targets;
            // file managers only see plain text today.
            RestoreContent::Files(uris) => self.clipboard.set_text(uri_list_body(&uris))?,
        }
        Ok(())
    }
}

/// Identity of the current clipboard content, covering text and image
fn content_signature(clipboard: &mut Clipboard) -> Option<String> {
    let text = clipboard.get_text().ok();
    let image = clipboard
        .get_image()
        .ok()
        .and_then(|data| to_clip_image(data).ok());
    signature_of(text.as_deref(), image.as_ref())
}

fn signature_of(text: Option<&str>, image: Option<&ClipImage>) -> Option<String> {
    if text.is_none() && image.is_none() {
        return None;
    }
    let text_part = text.map(|text| {
        if looks_like_uri_list(text) {
            format!("files:{}", hash_file_uris(&parse_uri_list(text)))
        } else {
            format!("text:{}", hash_text(text))
        }
    });
    let image_part = image.map(|image| format!("image:{}", image.fingerprint()));
    Some(format!(
        "{}|{}",
        text_part.unwrap_or_default(),
        image_part.unwrap_or_default()
    ))
}

/// Background poller that turns content changes into loop events
pub struct ChangePoller {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChangePoller {
    pub fn spawn(events: Sender<LoopEvent>, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();

        let handle = thread::spawn(move || {
            let mut clipboard = match Clipboard::new() {
                Ok(clipboard) => clipboard,
                Err(e) => {
                    warn!(error = %e, "Clipboard poller could not open the clipboard");
                    return;
                }
            };

            // Content already on the clipboard at startup is not a change
            let mut last = content_signature(&mut clipboard);
            info!(poll_interval_ms = interval.as_millis() as u64, "Clipboard poller started");

            while !stop.load(Ordering::Relaxed) {
                let start = Instant::now();
                let current = content_signature(&mut clipboard);

                if current != last {
                    last = current;
                    if last.is_some() && events.send(LoopEvent::ClipboardChanged).is_err() {
                        break;
                    }
                }

                let elapsed = start.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                }
            }
            info!("Clipboard poller stopping");
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Clipboard poller thread panicked");
            }
        }
    }
}

impl Drop for ChangePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_list_detection() {
        assert!(looks_like_uri_list("file:///a\nfile:///b"));
        assert!(looks_like_uri_list("# comment\r\nfile:///a\r\n"));
        assert!(!looks_like_uri_list("file:///a\nnot a uri"));
        assert!(!looks_like_uri_list("plain text"));
        assert!(!looks_like_uri_list("# only a comment"));
        assert!(!looks_like_uri_list(""));
    }

    #[test]
    fn test_to_clip_image_copies_pixels() {
        let data = ImageData {
            width: 1,
            height: 2,
            bytes: Cow::Owned(vec![1, 2, 3, 4, 5, 6, 7, 8]),
        };
        let image = to_clip_image(data).unwrap();
        assert_eq!((image.width, image.height), (1, 2));
        assert_eq!(image.rgba, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_signature_moves_when_only_image_changes() {
        let red = ClipImage::new(1, 1, vec![255, 0, 0, 255]);
        let blue = ClipImage::new(1, 1, vec![0, 0, 255, 255]);

        let with_red = signature_of(Some("caption"), Some(&red));
        let with_blue = signature_of(Some("caption"), Some(&blue));
        assert!(with_red.is_some());
        assert_ne!(with_red, with_blue);
        assert_ne!(signature_of(Some("caption"), None), with_red);
        assert_eq!(signature_of(None, None), None);
    }

    #[test]
    fn test_signature_ignores_uri_list_order() {
        assert_eq!(
            signature_of(Some("file:///a\nfile:///b"), None),
            signature_of(Some("file:///b\nfile:///a"), None)
        );
    }

    #[test]
    fn test_arboard_errors_map_to_clipboard_variant() {
        let err: ClipNoteError = arboard::Error::ContentNotAvailable.into();
        assert!(matches!(err, ClipNoteError::Clipboard(_)));
    }
}
