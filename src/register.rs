//! Face-registration submitter.
//!
//! External-facing and stateless: an identity label, a category tag
//! (defaulting to citizen), and image bytes from a file or from the current
//! live frame go out as one multipart request. Success raises a
//! confirmation alert; failure is swallowed, consistent with the polling
//! components' failure policy.

use std::path::{Path, PathBuf};

use crate::alert::AlertEngine;
use crate::api::BackendClient;
use crate::console::LiveFrame;
use crate::detect::Category;

#[derive(Clone, Debug)]
pub enum RegistrationImage {
    /// Operator-picked image file.
    File(PathBuf),
    /// Capture of the currently displayed live frame at native resolution.
    LiveFrame,
}

#[derive(Clone, Debug)]
pub struct RegistrationForm {
    pub id: String,
    pub category: Option<Category>,
    pub image: RegistrationImage,
}

pub fn submit(
    client: &BackendClient,
    alerts: &mut AlertEngine,
    live: Option<&LiveFrame>,
    form: &RegistrationForm,
) {
    let (bytes, filename) = match &form.image {
        RegistrationImage::File(path) => match std::fs::read(path) {
            Ok(bytes) => (bytes, file_name(path)),
            Err(err) => {
                log::debug!("registration image read failed: {}", err);
                return;
            }
        },
        RegistrationImage::LiveFrame => match live {
            Some(frame) => (frame.jpeg.clone(), "frame.jpg".to_string()),
            None => {
                log::debug!("registration skipped: no live frame yet");
                return;
            }
        },
    };

    let category = form.category.unwrap_or(Category::Citizen);
    match client.register_face(&form.id, category, &filename, &bytes) {
        Ok(()) => alerts.raise(format!("Registered face for {}", form.id)),
        Err(err) => log::debug!("face registration failed: {}", err),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.jpg".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SilentChime;

    #[test]
    fn missing_file_is_swallowed_without_alert() {
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        let mut alerts = AlertEngine::new(Box::new(SilentChime));
        let form = RegistrationForm {
            id: "S1".to_string(),
            category: None,
            image: RegistrationImage::File(PathBuf::from("/nonexistent/face.jpg")),
        };
        submit(&client, &mut alerts, None, &form);
        assert!(alerts.history().is_empty());
    }

    #[test]
    fn live_frame_capture_requires_a_frame() {
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        let mut alerts = AlertEngine::new(Box::new(SilentChime));
        let form = RegistrationForm {
            id: "S1".to_string(),
            category: Some(Category::Official),
            image: RegistrationImage::LiveFrame,
        };
        submit(&client, &mut alerts, None, &form);
        assert!(alerts.history().is_empty());
    }

    #[test]
    fn unreachable_backend_is_swallowed_without_alert() {
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        let mut alerts = AlertEngine::new(Box::new(SilentChime));
        let frame = LiveFrame {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 2,
            height: 2,
        };
        let form = RegistrationForm {
            id: "S1".to_string(),
            category: None,
            image: RegistrationImage::LiveFrame,
        };
        submit(&client, &mut alerts, Some(&frame), &form);
        assert!(alerts.history().is_empty());
    }
}
