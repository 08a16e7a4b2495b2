//! Console variable (ConVar) implementation.
//!
//! ConVars are typed variables that can be read and assigned from queries.
//! Every assignment arrives as a string and goes through the variable's
//! caster before it is stored.

use std::any::Any;
use std::fmt::{self, Display};

/// Flags controlling ConVar behavior.
///
/// These match the Source Engine FCVAR_ flags where applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConVarFlags(u32);

impl ConVarFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Value is written to the config file (FCVAR_ARCHIVE).
    ///
    /// **Security note**: ARCHIVE values are stored in plaintext.
    /// Do not mark sensitive data (passwords, tokens) with this flag.
    pub const ARCHIVE: Self = Self(1 << 0);

    /// Cheat-protected, cannot be assigned from the console (FCVAR_CHEAT).
    pub const CHEAT: Self = Self(1 << 1);

    /// Cannot be assigned from the console (FCVAR_READONLY).
    pub const READ_ONLY: Self = Self(1 << 2);

    /// Owned by the server, cannot be assigned locally (FCVAR_REPLICATED).
    pub const REPLICATED: Self = Self(1 << 3);

    /// Hidden from listings and search (FCVAR_HIDDEN).
    pub const HIDDEN: Self = Self(1 << 4);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Any flag that forbids assignment from a query.
    #[inline]
    pub const fn is_locked(self) -> bool {
        self.0 & (Self::READ_ONLY.0 | Self::CHEAT.0 | Self::REPLICATED.0) != 0
    }
}

impl std::ops::BitOr for ConVarFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for ConVarFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Trait for types that can be stored in a ConVar.
///
/// Implemented for `bool`, `i32`, `i64`, `f32`, `f64` and `String`.
pub trait ConVarValue: Clone + PartialEq + Send + Sync + 'static {
    /// Cast a raw string into a value, or explain why it can't be.
    fn cast(s: &str) -> Result<Self, String>;

    /// Format the value as a string.
    fn format(&self) -> String;

    /// Clamp the value to min/max bounds if applicable.
    fn clamp(self, _min: Option<&Self>, _max: Option<&Self>) -> Self {
        self
    }

    /// Human readable type name, used in listings.
    fn type_name() -> &'static str;
}

impl ConVarValue for bool {
    fn cast(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(format!("expected a boolean, got \"{}\"", s)),
        }
    }

    fn format(&self) -> String {
        if *self { "1".to_string() } else { "0".to_string() }
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

macro_rules! impl_numeric_value {
    ($ty:ty, $kind:literal) => {
        impl ConVarValue for $ty {
            fn cast(s: &str) -> Result<Self, String> {
                s.trim()
                    .parse()
                    .map_err(|_| format!("expected {}, got \"{}\"", $kind, s))
            }

            fn format(&self) -> String {
                self.to_string()
            }

            fn clamp(self, min: Option<&Self>, max: Option<&Self>) -> Self {
                let mut v = self;
                if let Some(&min) = min {
                    v = v.max(min);
                }
                if let Some(&max) = max {
                    v = v.min(max);
                }
                v
            }

            fn type_name() -> &'static str {
                stringify!($ty)
            }
        }
    };
}

impl_numeric_value!(i32, "an integer");
impl_numeric_value!(i64, "an integer");

macro_rules! impl_float_value {
    ($ty:ty) => {
        impl ConVarValue for $ty {
            fn cast(s: &str) -> Result<Self, String> {
                match s.trim().parse::<$ty>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(format!("expected a number, got \"{}\"", s)),
                }
            }

            fn format(&self) -> String {
                // Avoid unnecessary decimal places
                if self.fract() == 0.0 {
                    format!("{:.0}", self)
                } else {
                    format!("{}", self)
                }
            }

            fn clamp(self, min: Option<&Self>, max: Option<&Self>) -> Self {
                let mut v = self;
                if let Some(&min) = min {
                    v = v.max(min);
                }
                if let Some(&max) = max {
                    v = v.min(max);
                }
                v
            }

            fn type_name() -> &'static str {
                stringify!($ty)
            }
        }
    };
}

impl_float_value!(f32);
impl_float_value!(f64);

impl ConVarValue for String {
    fn cast(s: &str) -> Result<Self, String> {
        Ok(s.to_string())
    }

    fn format(&self) -> String {
        self.clone()
    }

    fn type_name() -> &'static str {
        "string"
    }
}

/// Converts a raw assignment into a typed value.
pub type Caster<T> = fn(&str) -> Result<T, String>;

/// Type-erased trait for ConVar storage.
///
/// This allows storing ConVars of different types in the same store.
pub trait ConVarDyn: Send + Sync {
    /// Current value as a string.
    fn get_string(&self) -> String;

    /// Cast and store a raw value.
    ///
    /// Returns `Ok(false)` when the cast value equals the current one, in
    /// which case nothing is written.
    fn set_string(&mut self, s: &str) -> Result<bool, String>;

    fn default_string(&self) -> String;

    /// Reset to default. Returns `true` if the value changed.
    fn reset(&mut self) -> bool;

    fn is_modified(&self) -> bool;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A console variable with typed value and constraints.
///
/// # Examples
///
/// ```
/// use bevy_console_script::core::{ConVar, ConVarFlags};
///
/// let mut gravity = ConVar::new("sv_gravity", 800.0f32)
///     .description("World gravity")
///     .flags(ConVarFlags::ARCHIVE);
///
/// assert_eq!(gravity.set_raw("1000"), Ok(true));
/// assert_eq!(gravity.get(), 1000.0);
///
/// // With min/max constraints
/// let mut fov = ConVar::new("cl_fov", 90i32).min(60).max(120);
/// fov.set_raw("150").unwrap();
/// assert_eq!(fov.get(), 120); // Clamped to max
/// ```
#[derive(Clone)]
pub struct ConVar<T: ConVarValue> {
    name: Box<str>,
    value: T,
    default: T,
    flags: ConVarFlags,
    description: &'static str,
    min: Option<T>,
    max: Option<T>,
    caster: Caster<T>,
}

impl<T: ConVarValue> ConVar<T> {
    pub fn new(name: impl Into<Box<str>>, default: T) -> Self {
        Self {
            name: name.into(),
            value: default.clone(),
            default,
            flags: ConVarFlags::NONE,
            description: "",
            min: None,
            max: None,
            caster: T::cast,
        }
    }

    pub fn description(mut self, desc: &'static str) -> Self {
        self.description = desc;
        self
    }

    pub fn flags(mut self, flags: ConVarFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn min(mut self, min: T) -> Self {
        self.min = Some(min);
        // Re-clamp current value
        self.value = self.value.clone().clamp(self.min.as_ref(), self.max.as_ref());
        self
    }

    pub fn max(mut self, max: T) -> Self {
        self.max = Some(max);
        self.value = self.value.clone().clamp(self.min.as_ref(), self.max.as_ref());
        self
    }

    /// Replace the default caster.
    ///
    /// ```
    /// use bevy_console_script::core::ConVar;
    ///
    /// let mut team = ConVar::new("mp_team", "red".to_string()).caster(|s| match s {
    ///     "red" | "blue" => Ok(s.to_string()),
    ///     _ => Err(format!("unknown team \"{}\"", s)),
    /// });
    /// assert!(team.set_raw("green").is_err());
    /// assert_eq!(team.set_raw("blue"), Ok(true));
    /// ```
    pub fn caster(mut self, caster: Caster<T>) -> Self {
        self.caster = caster;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn get(&self) -> T {
        self.value.clone()
    }

    #[inline]
    pub fn get_ref(&self) -> &T {
        &self.value
    }

    /// Cast and store a raw value, applying bounds.
    ///
    /// Flags are not checked here; the store enforces them.
    pub fn set_raw(&mut self, s: &str) -> Result<bool, String> {
        let value = (self.caster)(s)?.clamp(self.min.as_ref(), self.max.as_ref());
        if value == self.value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }

    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Reset to the default value. Returns `true` if the value changed.
    pub fn reset(&mut self) -> bool {
        if self.value == self.default {
            return false;
        }
        self.value = self.default.clone();
        true
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.value != self.default
    }

    #[inline]
    pub fn get_flags(&self) -> ConVarFlags {
        self.flags
    }

    #[inline]
    pub fn get_description(&self) -> &'static str {
        self.description
    }

    #[inline]
    pub fn has_bounds(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

impl<T: ConVarValue> ConVarDyn for ConVar<T> {
    fn get_string(&self) -> String {
        self.value.format()
    }

    fn set_string(&mut self, s: &str) -> Result<bool, String> {
        self.set_raw(s)
    }

    fn default_string(&self) -> String {
        self.default.format()
    }

    fn reset(&mut self) -> bool {
        ConVar::reset(self)
    }

    fn is_modified(&self) -> bool {
        ConVar::is_modified(self)
    }

    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: ConVarValue> Display for ConVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" = \"{}\"", self.name, self.value.format())?;
        if !self.description.is_empty() {
            write!(f, " - {}", self.description)?;
        }
        Ok(())
    }
}
