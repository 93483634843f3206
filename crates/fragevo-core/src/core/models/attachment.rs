use nalgebra::Vector3;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies the chemical class of an attachment point.
///
/// A class is a `rule:subclass` pair (e.g. `amine:0`). The rule names the
/// reaction/compatibility family, the subclass distinguishes symmetry-broken
/// variants of the same rule. Compatibility between classes is defined by the
/// fragment space, not by the class itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApClass {
    rule: String,
    subclass: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidApClass {
    #[error("Attachment point class rule is empty")]
    EmptyRule,
    #[error("Attachment point class rule '{0}' contains a reserved character")]
    ReservedCharacter(String),
    #[error("Malformed attachment point class string '{0}' (expected 'rule:subclass')")]
    Malformed(String),
}

impl ApClass {
    /// Creates a class from a rule name and a subclass index.
    ///
    /// The rule must be non-empty and free of the separator characters used
    /// by the string graph encoding (`:`, `_`, `,`, whitespace).
    pub fn new(rule: &str, subclass: u32) -> Result<Self, InvalidApClass> {
        if rule.is_empty() {
            return Err(InvalidApClass::EmptyRule);
        }
        if rule
            .chars()
            .any(|c| c == ':' || c == '_' || c == ',' || c.is_whitespace())
        {
            return Err(InvalidApClass::ReservedCharacter(rule.to_string()));
        }
        Ok(Self {
            rule: rule.to_string(),
            subclass,
        })
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn subclass(&self) -> u32 {
        self.subclass
    }
}

impl FromStr for ApClass {
    type Err = InvalidApClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rule, sub) = s
            .rsplit_once(':')
            .ok_or_else(|| InvalidApClass::Malformed(s.to_string()))?;
        let subclass = sub
            .parse::<u32>()
            .map_err(|_| InvalidApClass::Malformed(s.to_string()))?;
        Self::new(rule, subclass)
    }
}

impl fmt::Display for ApClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rule, self.subclass)
    }
}

/// Bond type carried by edges and attachment points.
///
/// `Undefined` marks ring-chord edges prior to ring-closure finalization;
/// `Any` is a wildcard used by queries, not by finished graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BondType {
    None,
    #[default]
    Single,
    Double,
    Triple,
    Quadruple,
    Undefined,
    Any,
}

impl BondType {
    /// Formal bond order, when the type corresponds to a chemical bond.
    pub fn valence_order(self) -> Option<u32> {
        match self {
            BondType::Single => Some(1),
            BondType::Double => Some(2),
            BondType::Triple => Some(3),
            BondType::Quadruple => Some(4),
            BondType::None | BondType::Undefined | BondType::Any => None,
        }
    }

    /// Short token used by the string graph encoding.
    pub fn code(self) -> &'static str {
        match self {
            BondType::None => "0",
            BondType::Single => "1",
            BondType::Double => "2",
            BondType::Triple => "3",
            BondType::Quadruple => "4",
            BondType::Undefined => "u",
            BondType::Any => "a",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid bond type string '{0}'")]
pub struct ParseBondTypeError(pub String);

impl FromStr for BondType {
    type Err = ParseBondTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(Self::None),
            "1" | "single" => Ok(Self::Single),
            "2" | "double" => Ok(Self::Double),
            "3" | "triple" => Ok(Self::Triple),
            "4" | "quadruple" => Ok(Self::Quadruple),
            "u" | "undefined" => Ok(Self::Undefined),
            "a" | "any" => Ok(Self::Any),
            _ => Err(ParseBondTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "None",
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Quadruple => "Quadruple",
                Self::Undefined => "Undefined",
                Self::Any => "Any",
            }
        )
    }
}

/// A typed, directional connection site on a vertex.
///
/// An attachment point is either free or consumed by exactly one edge. The
/// graph that owns the vertex is responsible for flipping the `used` flag
/// when edges are formed or removed; the AP itself carries no reference to
/// its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPoint {
    /// Chemical class determining which other APs this one may bond to.
    pub class: Option<ApClass>,
    /// Bond type formed when this AP is consumed.
    pub bond_type: BondType,
    /// Direction of the bond this AP would form, in the owner's local frame.
    pub direction: Vector3<f64>,
    used: bool,
}

impl AttachmentPoint {
    pub fn new(class: Option<ApClass>, bond_type: BondType, direction: Vector3<f64>) -> Self {
        Self {
            class,
            bond_type,
            direction,
            used: false,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.used
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub(crate) fn mark_used(&mut self) {
        self.used = true;
    }

    pub(crate) fn release(&mut self) {
        self.used = false;
    }
}
