use secrecy::SecretString;

/// Process-wide secrets resolved at startup, passed explicitly to the
/// components that need them.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub token_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self { token_secret }
    }
}
