use tracing::warn;

/// PIN check guarding the parent area. The PIN comes from configuration;
/// this is a convenience gate for a shared device, not an account system.
#[derive(Clone)]
pub struct ParentGate {
    pin: String,
}

impl ParentGate {
    pub fn new(pin: impl Into<String>) -> Self {
        Self {
            pin: pin.into().trim().to_string(),
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        let ok = !self.pin.is_empty() && candidate.trim() == self.pin;
        if !ok {
            warn!("Incorrect parent PIN entered");
        }
        ok
    }
}

impl std::fmt::Debug for ParentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentGate").field("pin", &"<redacted>").finish()
    }
}
