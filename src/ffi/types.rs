//! FFI Type System
//!
//! The primitive integer vocabulary the binding understands, the compile-time
//! signature of the bound symbol, and C-style declarations parsed from
//! configuration.

use std::fmt;

/// Primitive types that can appear in a bound native signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfiType {
    /// Void (no value)
    Void,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
}

impl FfiType {
    /// Parse a C or Rust spelling of a primitive type.
    ///
    /// C `int` is taken to be 32 bits, which holds on every platform
    /// `libloading` supports.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        let normalized = normalized
            .strip_prefix("const ")
            .unwrap_or(&normalized)
            .trim();
        match normalized {
            "void" => Some(FfiType::Void),
            "i8" | "int8" | "int8_t" | "signed char" => Some(FfiType::I8),
            "i16" | "int16" | "int16_t" | "short" => Some(FfiType::I16),
            "i32" | "int32" | "int32_t" | "int" | "signed" | "signed int" => Some(FfiType::I32),
            "i64" | "int64" | "int64_t" | "long long" => Some(FfiType::I64),
            "u8" | "uint8" | "uint8_t" | "unsigned char" => Some(FfiType::U8),
            "u16" | "uint16" | "uint16_t" | "unsigned short" => Some(FfiType::U16),
            "u32" | "uint32" | "uint32_t" | "unsigned" | "unsigned int" => Some(FfiType::U32),
            "u64" | "uint64" | "uint64_t" | "unsigned long long" => Some(FfiType::U64),
            _ => None,
        }
    }
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FfiType::Void => "void",
            FfiType::I8 => "i8",
            FfiType::I16 => "i16",
            FfiType::I32 => "i32",
            FfiType::I64 => "i64",
            FfiType::U8 => "u8",
            FfiType::U16 => "u16",
            FfiType::U32 => "u32",
            FfiType::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// Compile-time signature of a bound native symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFunctionSignature {
    /// Exported symbol name
    pub name: &'static str,
    /// Parameter types, in order
    pub params: &'static [FfiType],
    /// Return type
    pub return_type: FfiType,
}

/// `int32 add(int32, int32)`, C calling convention.
pub const ADD_SIGNATURE: NativeFunctionSignature = NativeFunctionSignature {
    name: "add",
    params: &[FfiType::I32, FfiType::I32],
    return_type: FfiType::I32,
};

/// Rust type of the resolved `add` symbol.
///
/// `C-unwind` lets a panic raised by native code written in Rust reach the
/// binding instead of aborting the process. The calling convention is
/// otherwise identical to `extern "C"`.
pub type AddFn = unsafe extern "C-unwind" fn(i32, i32) -> i32;

impl fmt::Display for NativeFunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_c_style(f, self.return_type, self.name, self.params)
    }
}

/// A function declaration parsed at runtime, e.g. from a config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfiSignature {
    /// Function name
    pub name: String,
    /// Parameter types
    pub params: Vec<FfiType>,
    /// Return type
    pub return_type: FfiType,
}

impl FfiSignature {
    /// Create a new function signature
    pub fn new(name: impl Into<String>, params: Vec<FfiType>, return_type: FfiType) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
        }
    }

    /// Parse from a C-style declaration
    /// Format: "return_type function_name(param1_type [name], ...)"
    pub fn parse(declaration: &str) -> Option<Self> {
        let declaration = declaration.trim().trim_end_matches(';').trim();

        let paren_pos = declaration.find('(')?;
        let before_paren = declaration[..paren_pos].trim();
        let inside = declaration[paren_pos + 1..].trim_end();
        let inside = inside.strip_suffix(')')?.trim();

        // Split return type and name
        let (return_type_str, name) = before_paren.rsplit_once(char::is_whitespace)?;
        let return_type = FfiType::parse(return_type_str)?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        if !inside.is_empty() && inside != "void" {
            for param in inside.split(',') {
                params.push(parse_param(param)?);
            }
        }

        Some(Self {
            name: name.to_string(),
            params,
            return_type,
        })
    }

    /// Whether this declaration describes the same symbol and types as `expected`
    pub fn matches(&self, expected: &NativeFunctionSignature) -> bool {
        self.name == expected.name
            && self.return_type == expected.return_type
            && self.params.as_slice() == expected.params
    }
}

impl From<NativeFunctionSignature> for FfiSignature {
    fn from(sig: NativeFunctionSignature) -> Self {
        Self::new(sig.name, sig.params.to_vec(), sig.return_type)
    }
}

impl fmt::Display for FfiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_c_style(f, self.return_type, &self.name, &self.params)
    }
}

/// A parameter is a type optionally followed by a name: try the whole text
/// as a type first, then drop the trailing identifier.
fn parse_param(param: &str) -> Option<FfiType> {
    let param = param.trim();
    if let Some(ty) = FfiType::parse(param) {
        return Some(ty);
    }
    let (ty, _name) = param.rsplit_once(char::is_whitespace)?;
    FfiType::parse(ty)
}

fn write_c_style(
    f: &mut fmt::Formatter<'_>,
    return_type: FfiType,
    name: &str,
    params: &[FfiType],
) -> fmt::Result {
    write!(f, "{} {}(", return_type, name)?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", param)?;
    }
    write!(f, ")")
}
