use std::collections::HashMap;
use std::fmt;

/// Identity providers a bearer token's `idp` claim may name. The full
/// constant set is carried even though only a couple are registered by
/// default, so adding a provider is a one-line [`IdpRegistry::register`]
/// call rather than a new string literal scattered through match arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Idp {
    Anonymous,
    Apple,
    EpicGames,
    Facebook,
    Google,
    Microsoft,
    Nintendo,
    Psn,
    Steam,
}

impl Idp {
    pub const ALL: [Idp; 9] = [
        Idp::Anonymous,
        Idp::Apple,
        Idp::EpicGames,
        Idp::Facebook,
        Idp::Google,
        Idp::Microsoft,
        Idp::Nintendo,
        Idp::Psn,
        Idp::Steam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Idp::Anonymous => "anonymous",
            Idp::Apple => "apple",
            Idp::EpicGames => "epic_games",
            Idp::Facebook => "facebook",
            Idp::Google => "google",
            Idp::Microsoft => "microsoft",
            Idp::Nintendo => "nintendo",
            Idp::Psn => "psn",
            Idp::Steam => "steam",
        }
    }
}

impl fmt::Display for Idp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a claim names an idp string this build doesn't
/// recognize at all (distinct from a recognized-but-unregistered idp,
/// which `IdpRegistry::verify` reports instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownIdp(pub String);

impl fmt::Display for UnknownIdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized idp {:?}", self.0)
    }
}

impl std::error::Error for UnknownIdp {}

impl std::str::FromStr for Idp {
    type Err = UnknownIdp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Idp::ALL
            .into_iter()
            .find(|idp| idp.as_str() == s)
            .ok_or_else(|| UnknownIdp(s.to_owned()))
    }
}

/// Maps a registered `(idp, app_id)` pair to "this token came from a
/// deployment we trust". Built with [`IdpRegistry::with_defaults`]
/// (`anonymous -> ""`, `steam -> "480"`) and extended at startup.
#[derive(Debug, Clone, Default)]
pub struct IdpRegistry {
    app_ids: HashMap<Idp, String>,
}

impl IdpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Idp::Anonymous, "");
        registry.register(Idp::Steam, "480");
        registry
    }

    pub fn register(&mut self, idp: Idp, app_id: impl Into<String>) {
        self.app_ids.insert(idp, app_id.into());
    }

    /// `true` iff `idp` is registered and its registered app id matches.
    pub fn verify(&self, idp: Idp, app_id: &str) -> bool {
        self.app_ids.get(&idp).is_some_and(|expected| expected == app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn default_registry_accepts_steam_with_registered_app_id() {
        let registry = IdpRegistry::with_defaults();
        assert!(registry.verify(Idp::Steam, "480"));
    }

    #[test]
    fn default_registry_rejects_mismatched_app_id() {
        let registry = IdpRegistry::with_defaults();
        assert!(!registry.verify(Idp::Steam, "999"));
    }

    #[test]
    fn default_registry_rejects_unregistered_idp() {
        let registry = IdpRegistry::with_defaults();
        assert!(!registry.verify(Idp::Apple, ""));
    }

    #[test]
    fn idp_round_trips_through_its_string_form() {
        for idp in Idp::ALL {
            assert_eq!(Idp::from_str(idp.as_str()).unwrap(), idp);
        }
    }

    #[test]
    fn unrecognized_idp_string_is_an_error() {
        assert!(Idp::from_str("not-a-real-idp").is_err());
    }
}
