//! Operations, interfaces and the module that owns them.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ModelError;
use super::types::{ElementType, Parameter};

/// A contiguous range of function ids served by one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UuidRange {
    pub lo: u64,
    pub hi: u64,
}

/// Attribute set attached to an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationAttributes {
    pub noopcode: bool,
    pub noexceptions: bool,
    pub allow_reply_only: bool,
    /// Operation is sent by the server to the client (`[out]` on the
    /// operation); it never appears in the server's dispatch table.
    #[serde(rename = "out")]
    pub out_only: bool,
    pub uuid: Option<u64>,
    pub uuid_range: Option<UuidRange>,
}

/// One IDL operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_type: ElementType,
    #[serde(default)]
    pub attributes: OperationAttributes,
}

impl Operation {
    /// Create an operation with no parameters and a `void` return type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: ElementType::Void,
            attributes: OperationAttributes::default(),
        }
    }

    /// Builder-style helper: append a parameter.
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Builder-style helper: set the return type.
    pub fn returns(mut self, ty: ElementType) -> Self {
        self.return_type = ty;
        self
    }

    /// Builder-style helper: adjust the attribute set.
    pub fn with_attributes(mut self, f: impl FnOnce(&mut OperationAttributes)) -> Self {
        f(&mut self.attributes);
        self
    }

    /// Find a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn has_return(&self) -> bool {
        !self.return_type.is_void()
    }
}

/// Attribute set attached to an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceAttributes {
    pub uuid: Option<u64>,
    /// External function invoked for unknown opcodes.
    pub default_function: Option<String>,
}

/// One IDL interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    /// Base interfaces in declaration order.
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub attributes: InterfaceAttributes,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Interface {
    /// Create an empty interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            attributes: InterfaceAttributes::default(),
            operations: Vec::new(),
        }
    }

    /// Builder-style helper: append a base interface name.
    pub fn base(mut self, name: impl Into<String>) -> Self {
        self.bases.push(name.into());
        self
    }

    /// Builder-style helper: append an operation.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Builder-style helper: adjust the attribute set.
    pub fn with_attributes(mut self, f: impl FnOnce(&mut InterfaceAttributes)) -> Self {
        f(&mut self.attributes);
        self
    }

    /// Find an operation by name.
    pub fn find_operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// The parsed compilation unit: every interface of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<Interface>,
}

impl Module {
    /// Build a module from interfaces and validate it.
    pub fn new(interfaces: Vec<Interface>) -> Result<Self, ModelError> {
        let module = Self { interfaces };
        module.validate()?;
        Ok(module)
    }

    /// Load a serialized module from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ModelError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a serialized module from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let module: Module = toml::from_str(content)?;
        module.validate()?;
        Ok(module)
    }

    /// Look up an interface by name.
    pub fn interface(&self, name: &str) -> Result<&Interface, ModelError> {
        self.interfaces
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| ModelError::UnknownInterface(name.to_string()))
    }

    /// Look up an operation of an interface.
    pub fn operation(&self, interface: &str, operation: &str) -> Result<(&Interface, &Operation), ModelError> {
        let iface = self.interface(interface)?;
        let op = iface
            .find_operation(operation)
            .ok_or_else(|| ModelError::UnknownOperation {
                interface: interface.to_string(),
                operation: operation.to_string(),
            })?;
        Ok((iface, op))
    }

    /// Direct base interfaces of `iface`, in declaration order.
    pub fn bases_of(&self, iface: &Interface) -> Result<Vec<&Interface>, ModelError> {
        iface
            .bases
            .iter()
            .map(|b| {
                self.interface(b).map_err(|_| ModelError::UnknownBase {
                    interface: iface.name.clone(),
                    base: b.clone(),
                })
            })
            .collect()
    }

    /// `iface` followed by its bases, depth first in declaration order.
    ///
    /// An interface reached twice through diamond inheritance is listed
    /// once, at its first position.
    pub fn ancestry<'a>(&'a self, iface: &'a Interface) -> Result<Vec<&'a Interface>, ModelError> {
        let mut out = Vec::new();
        self.collect_ancestry(iface, &mut out)?;
        Ok(out)
    }

    fn collect_ancestry<'a>(&'a self, iface: &'a Interface, out: &mut Vec<&'a Interface>) -> Result<(), ModelError> {
        if out.iter().any(|i| i.name == iface.name) {
            return Ok(());
        }
        out.push(iface);
        for base in self.bases_of(iface)? {
            self.collect_ancestry(base, out)?;
        }
        Ok(())
    }

    /// Check name uniqueness, base resolution and acyclic inheritance.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if !seen.insert(iface.name.as_str()) {
                return Err(ModelError::DuplicateInterface(iface.name.clone()));
            }
            let mut ops = HashSet::new();
            for op in &iface.operations {
                if !ops.insert(op.name.as_str()) {
                    return Err(ModelError::DuplicateOperation {
                        interface: iface.name.clone(),
                        operation: op.name.clone(),
                    });
                }
                if let Some(range) = op.attributes.uuid_range
                    && range.lo > range.hi
                {
                    return Err(ModelError::EmptyUuidRange {
                        operation: op.name.clone(),
                        lo: range.lo,
                        hi: range.hi,
                    });
                }
                let mut params = HashSet::new();
                for p in &op.parameters {
                    if !params.insert(p.name.as_str()) {
                        return Err(ModelError::DuplicateParameter {
                            operation: op.name.clone(),
                            parameter: p.name.clone(),
                        });
                    }
                }
            }
            self.bases_of(iface)?;
        }
        for iface in &self.interfaces {
            self.check_acyclic(iface, &mut Vec::new())?;
        }
        Ok(())
    }

    fn check_acyclic<'a>(&'a self, iface: &'a Interface, path: &mut Vec<&'a str>) -> Result<(), ModelError> {
        if path.contains(&iface.name.as_str()) {
            return Err(ModelError::InheritanceCycle(iface.name.clone()));
        }
        path.push(&iface.name);
        for base in self.bases_of(iface)? {
            self.check_acyclic(base, path)?;
        }
        path.pop();
        Ok(())
    }
}
