//! Sealed provider registry
//!
//! Packages that are activated for side effects contribute providers
//! (codecs, schemes, drivers) keyed by a string discriminant. The
//! registry is built in two explicit phases: a [`RegistryBuilder`]
//! collects registrations while activation runs, then [`seal`] turns it
//! into an immutable [`Registry`] that is read-only and lock-free for
//! the rest of the process. There is no ambient global table; whoever
//! runs activation owns the builder and hands out the sealed registry.
//!
//! [`seal`]: RegistryBuilder::seal

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Opens a value from raw input, e.g. decodes an image from its bytes.
pub type OpenFn = Arc<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send>, String> + Send + Sync>;

/// Cheap content sniff: does this input belong to the provider?
pub type ProbeFn = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// One registered capability: an opaque open/probe pair.
#[derive(Clone)]
pub struct Provider {
    open: OpenFn,
    probe: ProbeFn,
}

impl Provider {
    pub fn new(open: OpenFn, probe: ProbeFn) -> Self {
        Self { open, probe }
    }

    pub fn open(&self, input: &[u8]) -> Result<Box<dyn Any + Send>, String> {
        (self.open)(input)
    }

    pub fn probe(&self, input: &[u8]) -> bool {
        (self.probe)(input)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no provider registered for '{0}'")]
    UnknownProvider(String),

    #[error("duplicate provider for '{discriminant}': registered by '{kept}' and '{rejected}'")]
    DuplicateRegistration {
        discriminant: String,
        kept: String,
        rejected: String,
    },
}

/// How a second registration under an existing discriminant is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the first registration, record a diagnostic, carry on.
    #[default]
    FirstWins,
    /// Make sealing fail on the first duplicate.
    Fatal,
}

/// Diagnostic record of a registration that lost under
/// [`ConflictPolicy::FirstWins`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConflict {
    pub discriminant: String,
    /// Origin of the registration that was kept.
    pub kept: String,
    /// Origin of the registration that was dropped.
    pub rejected: String,
}

struct Registration {
    discriminant: String,
    origin: String,
    provider: Provider,
}

/// Mutable registration phase.
#[derive(Default)]
pub struct RegistryBuilder {
    policy: ConflictPolicy,
    registrations: Vec<Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record a registration. `origin` names who is registering (an
    /// import identifier in practice) and only feeds diagnostics.
    /// Conflicts are detected at seal time, not here, so registration
    /// order never changes the reported pairs.
    pub fn register(
        &mut self,
        discriminant: impl Into<String>,
        origin: impl Into<String>,
        provider: Provider,
    ) -> &mut Self {
        self.registrations.push(Registration {
            discriminant: discriminant.into(),
            origin: origin.into(),
            provider,
        });
        self
    }

    /// Freeze the table. Under `FirstWins` duplicates become
    /// [`RegistrationConflict`] diagnostics on the sealed registry;
    /// under `Fatal` the first duplicate fails the seal.
    pub fn seal(self) -> Result<Registry, RegistryError> {
        let mut ordered: Vec<(String, Provider)> = Vec::with_capacity(self.registrations.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut origins: HashMap<String, String> = HashMap::new();
        let mut conflicts = Vec::new();

        for reg in self.registrations {
            match index.get(&reg.discriminant) {
                None => {
                    index.insert(reg.discriminant.clone(), ordered.len());
                    origins.insert(reg.discriminant.clone(), reg.origin);
                    ordered.push((reg.discriminant, reg.provider));
                }
                Some(_) => {
                    let kept = origins
                        .get(&reg.discriminant)
                        .cloned()
                        .unwrap_or_default();
                    if self.policy == ConflictPolicy::Fatal {
                        return Err(RegistryError::DuplicateRegistration {
                            discriminant: reg.discriminant,
                            kept,
                            rejected: reg.origin,
                        });
                    }
                    conflicts.push(RegistrationConflict {
                        discriminant: reg.discriminant,
                        kept,
                        rejected: reg.origin,
                    });
                }
            }
        }

        Ok(Registry {
            ordered,
            index,
            conflicts,
        })
    }
}

/// Immutable provider table. All reads are lock-free; cloning is not
/// supported, share it behind an `Arc` instead.
#[derive(Debug)]
pub struct Registry {
    /// Providers in registration order; probe resolution walks this.
    ordered: Vec<(String, Provider)>,
    index: HashMap<String, usize>,
    conflicts: Vec<RegistrationConflict>,
}

impl Registry {
    pub fn resolve(&self, discriminant: &str) -> Result<&Provider, RegistryError> {
        self.index
            .get(discriminant)
            .map(|&i| &self.ordered[i].1)
            .ok_or_else(|| RegistryError::UnknownProvider(discriminant.to_string()))
    }

    /// First provider, in registration order, whose probe accepts the
    /// input.
    pub fn resolve_probe(&self, input: &[u8]) -> Option<(&str, &Provider)> {
        self.ordered
            .iter()
            .find(|(_, p)| p.probe(input))
            .map(|(name, p)| (name.as_str(), p))
    }

    /// Registered discriminants in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Duplicate registrations dropped under `FirstWins`.
    pub fn conflicts(&self) -> &[RegistrationConflict] {
        &self.conflicts
    }
}
