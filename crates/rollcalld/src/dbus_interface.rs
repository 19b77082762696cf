use crate::attendance::{authenticate, Attendance, AttendanceError, Outcome};
use std::sync::Arc;
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "org.rollcall.Rollcall1";
pub const OBJECT_PATH: &str = "/org/rollcall/Rollcall1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
///
/// Attendance verdicts come back as JSON payloads carrying an HTTP-style
/// status; only server faults are raised as D-Bus errors.
pub struct RollcallService {
    attendance: Arc<Attendance>,
}

impl RollcallService {
    pub fn new(attendance: Arc<Attendance>) -> Self {
        Self { attendance }
    }
}

fn to_fdo(e: AttendanceError) -> fdo::Error {
    match e {
        AttendanceError::Unauthenticated => fdo::Error::AccessDenied(e.to_string()),
        e if e.is_client_outcome() => fdo::Error::InvalidArgs(e.to_string()),
        e => {
            tracing::error!(error = %e, "request failed");
            fdo::Error::Failed(e.to_string())
        }
    }
}

fn rejection(e: &AttendanceError) -> String {
    serde_json::json!({
        "status": e.status_code(),
        "verdict": e.verdict(),
        "message": e.to_string(),
    })
    .to_string()
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Prepare storage for a newly authenticated user.
    async fn register(&self, user: &str) -> fdo::Result<()> {
        tracing::info!(user, "register requested");
        let identity = authenticate(user).map_err(to_fdo)?;
        self.attendance.register(&identity).await.map_err(to_fdo)
    }

    /// Store one or more reference images for the user.
    async fn enroll(&self, user: &str, images: Vec<Vec<u8>>) -> fdo::Result<String> {
        tracing::info!(user, count = images.len(), "enroll requested");
        let result = match authenticate(user) {
            Ok(identity) => self.attendance.enroll(&identity, images).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(keys) => Ok(serde_json::json!({ "status": 200, "success": true, "keys": keys }).to_string()),
            Err(e) if e.is_client_outcome() => Ok(rejection(&e)),
            Err(e) => Err(to_fdo(e)),
        }
    }

    /// Check a probe image against the user's enrolled references.
    async fn mark_attendance(&self, user: &str, image: Vec<u8>) -> fdo::Result<String> {
        tracing::info!(user, size = image.len(), "attendance requested");
        let result = match authenticate(user) {
            Ok(identity) => self.attendance.mark(&identity, image).await,
            Err(e) => Err(e),
        };
        let outcome = Outcome::from_mark(result).map_err(to_fdo)?;
        serde_json::to_string(&outcome).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// List the user's stored reference image keys.
    async fn list_references(&self, user: &str) -> fdo::Result<String> {
        tracing::info!(user, "list_references requested");
        let identity = authenticate(user).map_err(to_fdo)?;
        let keys = self.attendance.references(&identity).await.map_err(to_fdo)?;
        Ok(serde_json::json!(keys).to_string())
    }

    /// Remove one reference image by key.
    async fn remove_reference(&self, user: &str, key: &str) -> fdo::Result<bool> {
        tracing::info!(user, key, "remove_reference requested");
        let identity = authenticate(user).map_err(to_fdo)?;
        match self.attendance.remove(&identity, key).await {
            Ok(()) => Ok(true),
            Err(AttendanceError::ReferenceNotFound(_)) => Ok(false),
            Err(e) => Err(to_fdo(e)),
        }
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        Ok(self.attendance.status().await.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(to_fdo(AttendanceError::Unauthenticated), fdo::Error::AccessDenied(_)));
        assert!(matches!(to_fdo(AttendanceError::NoFaceDetected), fdo::Error::InvalidArgs(_)));
        assert!(matches!(to_fdo(AttendanceError::PoolClosed), fdo::Error::Failed(_)));
    }

    #[test]
    fn test_rejection_payload() {
        let json: serde_json::Value =
            serde_json::from_str(&rejection(&AttendanceError::InvalidImage("bad".into()))).unwrap();
        assert_eq!(json["status"], 400);
        assert_eq!(json["verdict"], "invalid_image");
    }
}
