//! Instruction and register catalog.
//!
//! The catalog is plain configuration: mnemonics with their encoding fields and operand shapes,
//! plus the register alias table. The built-in one is `data/catalog.json`.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Deserialize;

const BUILTIN_CATALOG: &str = include_str!("../../../data/catalog.json");

lazy_static! {
    static ref CATALOG: Catalog = Catalog::from_json(BUILTIN_CATALOG)
        .unwrap_or_else(|err| panic!("built-in instruction catalog is malformed: {err}"));
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown hand-built pseudo instruction `{0}`")]
    UnknownPseudo(String),
    #[error("bad operand shapes for `{0}`")]
    BadArgs(String),
    #[error("pseudo instruction `{0}` has no template")]
    MissingTemplate(String),
    #[error("expected {expected} {class} registers, found {found}")]
    RegisterCount {
        class: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("instruction `{0}` is defined twice")]
    DuplicateInstruction(String),
}

/// Operand shape of one argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ArgShape {
    #[serde(rename = "reg")]
    Reg,
    #[serde(rename = "freg")]
    FReg,
    #[serde(rename = "offreg")]
    OffReg,
    #[serde(rename = "label")]
    Label,
    #[serde(rename = "5bit")]
    Imm5,
    #[serde(rename = "12bit")]
    Imm12,
    #[serde(rename = "20bit")]
    Imm20,
    #[serde(rename = "int")]
    Int,
}

impl ArgShape {
    fn reg_class(self) -> Option<RegClass> {
        match self {
            ArgShape::Reg => Some(RegClass::Int),
            ArgShape::FReg => Some(RegClass::Float),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegClass {
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub index: u8,
    pub class: RegClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IForm {
    /// `rd, rs1, imm12`
    RegImm { rd: RegClass, rs1: RegClass },
    /// `rd, rs1, shamt` with `pimm` in the funct7 slot.
    Shift {
        rd: RegClass,
        rs1: RegClass,
        pimm: u8,
    },
    /// `rd, imm(rs1)` or `rd, label`
    OffReg { rd: RegClass },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoOp {
    La,
    Li,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    R {
        opcode: u8,
        funct3: u8,
        funct7: u8,
        regs: [RegClass; 3],
    },
    I {
        opcode: u8,
        funct3: u8,
        form: IForm,
    },
    S {
        opcode: u8,
        funct3: u8,
        src: RegClass,
    },
    B {
        opcode: u8,
        funct3: u8,
        regs: [RegClass; 2],
    },
    J {
        opcode: u8,
    },
    U {
        opcode: u8,
    },
    W {
        code: u32,
    },
    /// Template expansion; `%1`, `%2`... name the positional arguments.
    Fake {
        params: usize,
        template: Vec<String>,
    },
    ReallyFake(PseudoOp),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrDesc {
    pub name: String,
    pub kind: InstrKind,
}

#[derive(Debug, Clone, Copy, Deserialize)]
enum EntryFormat {
    R,
    I,
    S,
    B,
    J,
    U,
    W,
    #[serde(rename = "fake")]
    Fake,
    #[serde(rename = "reallyfake")]
    ReallyFake,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(rename = "type")]
    format: EntryFormat,
    #[serde(default)]
    opcode: u8,
    #[serde(default)]
    funct3: u8,
    #[serde(default)]
    funct7: u8,
    #[serde(default)]
    pimm: Option<u8>,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    args: Vec<ArgShape>,
    #[serde(default)]
    replace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterTable {
    int: Vec<Vec<String>>,
    float: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    registers: RegisterTable,
    instructions: Vec<CatalogEntry>,
}

impl CatalogEntry {
    fn into_desc(self) -> Result<InstrDesc, CatalogError> {
        let bad_args = || CatalogError::BadArgs(self.name.clone());
        let class_at = |idx: usize| {
            self.args
                .get(idx)
                .and_then(|shape| shape.reg_class())
                .ok_or_else(bad_args)
        };

        let kind = match self.format {
            EntryFormat::R => InstrKind::R {
                opcode: self.opcode,
                funct3: self.funct3,
                funct7: self.funct7,
                regs: [class_at(0)?, class_at(1)?, class_at(2)?],
            },
            EntryFormat::I => {
                let form = match (self.args.get(1), self.pimm) {
                    (Some(ArgShape::OffReg), _) => IForm::OffReg { rd: class_at(0)? },
                    (_, Some(pimm)) => IForm::Shift {
                        rd: class_at(0)?,
                        rs1: class_at(1)?,
                        pimm,
                    },
                    _ => IForm::RegImm {
                        rd: class_at(0)?,
                        rs1: class_at(1)?,
                    },
                };
                InstrKind::I {
                    opcode: self.opcode,
                    funct3: self.funct3,
                    form,
                }
            }
            EntryFormat::S => InstrKind::S {
                opcode: self.opcode,
                funct3: self.funct3,
                src: class_at(0)?,
            },
            EntryFormat::B => InstrKind::B {
                opcode: self.opcode,
                funct3: self.funct3,
                regs: [class_at(0)?, class_at(1)?],
            },
            EntryFormat::J => InstrKind::J {
                opcode: self.opcode,
            },
            EntryFormat::U => InstrKind::U {
                opcode: self.opcode,
            },
            EntryFormat::W => InstrKind::W { code: self.code },
            EntryFormat::Fake => {
                let template = self
                    .replace
                    .as_deref()
                    .ok_or_else(|| CatalogError::MissingTemplate(self.name.clone()))?
                    .lines()
                    .map(str::to_owned)
                    .collect();
                InstrKind::Fake {
                    params: self.args.len(),
                    template,
                }
            }
            EntryFormat::ReallyFake => match self.name.as_str() {
                "la" => InstrKind::ReallyFake(PseudoOp::La),
                "li" => InstrKind::ReallyFake(PseudoOp::Li),
                _ => return Err(CatalogError::UnknownPseudo(self.name)),
            },
        };

        Ok(InstrDesc {
            name: self.name,
            kind,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    instrs: Vec<InstrDesc>,
    by_name: HashMap<String, usize>,
    registers: HashMap<String, Register>,
    int_names: Vec<String>,
    float_names: Vec<String>,
}

impl Catalog {
    /// The built-in catalog.
    pub fn global() -> &'static Catalog {
        &CATALOG
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)?;

        let mut registers = HashMap::new();
        let int_names = Self::load_registers(&file.registers.int, RegClass::Int, &mut registers)?;
        let float_names =
            Self::load_registers(&file.registers.float, RegClass::Float, &mut registers)?;

        let mut instrs = Vec::with_capacity(file.instructions.len());
        let mut by_name = HashMap::with_capacity(file.instructions.len());
        for entry in file.instructions {
            let desc = entry.into_desc()?;
            if by_name.insert(desc.name.clone(), instrs.len()).is_some() {
                return Err(CatalogError::DuplicateInstruction(desc.name));
            }
            instrs.push(desc);
        }

        log::debug!(
            "catalog loaded: {} instructions, {} register names",
            instrs.len(),
            registers.len()
        );

        Ok(Self {
            instrs,
            by_name,
            registers,
            int_names,
            float_names,
        })
    }

    fn load_registers(
        table: &[Vec<String>],
        class: RegClass,
        registers: &mut HashMap<String, Register>,
    ) -> Result<Vec<String>, CatalogError> {
        let class_name = match class {
            RegClass::Int => "integer",
            RegClass::Float => "float",
        };
        let count_err = |found| CatalogError::RegisterCount {
            class: class_name,
            expected: 32,
            found,
        };

        if table.len() != 32 {
            return Err(count_err(table.len()));
        }

        let mut canonical = Vec::with_capacity(32);
        for (index, aliases) in table.iter().enumerate() {
            let first = aliases.first().ok_or_else(|| count_err(index))?;
            canonical.push(first.clone());
            for alias in aliases {
                registers.insert(
                    alias.clone(),
                    Register {
                        index: index as u8,
                        class,
                    },
                );
            }
        }
        Ok(canonical)
    }

    pub fn instr(&self, name: &str) -> Option<&InstrDesc> {
        self.by_name.get(name).map(|&idx| &self.instrs[idx])
    }

    pub fn is_instruction(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn register(&self, name: &str) -> Option<Register> {
        self.registers.get(name).copied()
    }

    pub fn instrs(&self) -> &[InstrDesc] {
        &self.instrs
    }

    /// Canonical (ABI) name of integer register `idx`.
    pub fn int_reg_name(&self, idx: u8) -> &str {
        self.int_names
            .get(idx as usize)
            .map_or("?", String::as_str)
    }

    pub fn float_reg_name(&self, idx: u8) -> &str {
        self.float_names
            .get(idx as usize)
            .map_or("?", String::as_str)
    }

    /// First entry, in catalog order, whose encoding fields satisfy `pred`.
    pub fn find(&self, pred: impl Fn(&InstrKind) -> bool) -> Option<&InstrDesc> {
        self.instrs.iter().find(|desc| pred(&desc.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::from_json(BUILTIN_CATALOG).unwrap();

        assert!(catalog.is_instruction("addi"));
        assert!(catalog.is_instruction("bleu"));
        assert!(!catalog.is_instruction("mul"));

        assert_eq!(
            catalog.instr("sub").unwrap().kind,
            InstrKind::R {
                opcode: 0x33,
                funct3: 0,
                funct7: 0x20,
                regs: [RegClass::Int; 3],
            }
        );
        assert_eq!(
            catalog.instr("srai").unwrap().kind,
            InstrKind::I {
                opcode: 0x13,
                funct3: 5,
                form: IForm::Shift {
                    rd: RegClass::Int,
                    rs1: RegClass::Int,
                    pimm: 0x20,
                },
            }
        );
        assert_eq!(
            catalog.instr("lw").unwrap().kind,
            InstrKind::I {
                opcode: 0x03,
                funct3: 2,
                form: IForm::OffReg { rd: RegClass::Int },
            }
        );
        assert_eq!(
            catalog.instr("li").unwrap().kind,
            InstrKind::ReallyFake(PseudoOp::Li)
        );
        assert_eq!(
            catalog.instr("bgt").unwrap().kind,
            InstrKind::Fake {
                params: 3,
                template: vec!["blt %2, %1, %3".to_owned()],
            }
        );
    }

    #[test]
    fn test_register_aliases() {
        let catalog = Catalog::global();

        let s0 = catalog.register("s0").unwrap();
        assert_eq!(catalog.register("fp"), Some(s0));
        assert_eq!(catalog.register("x8"), Some(s0));
        assert_eq!(s0.index, 8);

        assert_eq!(
            catalog.register("fa0"),
            Some(Register {
                index: 10,
                class: RegClass::Float,
            })
        );
        assert_eq!(catalog.register("x32"), None);

        assert_eq!(catalog.int_reg_name(0), "zero");
        assert_eq!(catalog.int_reg_name(31), "t6");
        assert_eq!(catalog.float_reg_name(8), "fs0");
    }

    #[test]
    fn test_catalog_errors() {
        let regs = |n: usize| {
            let names: Vec<String> = (0..n).map(|i| format!("[\"x{i}\"]")).collect();
            names.join(",")
        };
        let with_instrs = |instrs: &str| {
            format!(
                "{{\"registers\":{{\"int\":[{}],\"float\":[{}]}},\"instructions\":[{instrs}]}}",
                regs(32),
                regs(32)
            )
        };

        assert!(matches!(
            Catalog::from_json("{"),
            Err(CatalogError::Json(_))
        ));

        let short = format!(
            "{{\"registers\":{{\"int\":[{}],\"float\":[]}},\"instructions\":[]}}",
            regs(31)
        );
        assert!(matches!(
            Catalog::from_json(&short),
            Err(CatalogError::RegisterCount { found: 31, .. })
        ));

        let pseudo = with_instrs(r#"{"name":"lla","type":"reallyfake","args":["reg","label"]}"#);
        assert!(matches!(
            Catalog::from_json(&pseudo),
            Err(CatalogError::UnknownPseudo(name)) if name == "lla"
        ));

        let twice = with_instrs(
            r#"{"name":"ecall","type":"W","code":115},{"name":"ecall","type":"W","code":115}"#,
        );
        assert!(matches!(
            Catalog::from_json(&twice),
            Err(CatalogError::DuplicateInstruction(_))
        ));

        let no_template = with_instrs(r#"{"name":"nop","type":"fake","args":[]}"#);
        assert!(matches!(
            Catalog::from_json(&no_template),
            Err(CatalogError::MissingTemplate(_))
        ));
    }
}
