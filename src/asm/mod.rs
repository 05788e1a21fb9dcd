//! Assembler and linker.
//!
//! Files are assembled one after another straight into a [`Ram`] image. Labels are local to the
//! file that defines them unless exported with `.global`. Relocations a file cannot resolve
//! itself are kept until every file is done and then resolved against the exported labels.

mod encoder;
pub mod error;
pub mod linker;
pub mod operand;
pub mod token;

#[cfg(test)]
mod tests;

use std::{collections::HashMap, rc::Rc};

use log::{debug, info};
use phf::phf_map;
use smallvec::SmallVec;

pub use error::{AssemblyError, AssemblyErrorKind, TraceFrame};
pub use linker::{RelocKind, Relocation};
pub use operand::Operand;
pub use token::{Token, TokenKind, Tokens, tokenize};

use crate::{
    config::{
        arch_config::{AddrType, WordType},
        ram_config::{DATA_BASE, SEGMENT_SIZE, TEXT_BASE},
    },
    isa::riscv::{Catalog, catalog::RegClass, disasm::disassemble_with},
    ram::Ram,
    utils::MemValue,
};
use operand::{LineReader, Vars};

type KindResult<T> = Result<T, AssemblyErrorKind>;

/// Nested macro calls deeper than this are reported instead of overflowing the stack.
const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Place {
    Text,
    Data,
}

impl Place {
    fn name(self) -> &'static str {
        match self {
            Place::Text => "text",
            Place::Data => "data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataDirective {
    Byte,
    Half,
    Word,
    Dword,
    Float,
    Double,
    Ascii,
    Asciz,
}

#[derive(Debug, Clone, Copy)]
enum Directive {
    Place(Place),
    Data(DataDirective),
    Global,
    Macro,
    EndMacro,
}

static DIRECTIVES: phf::Map<&'static str, Directive> = phf_map! {
    "text" => Directive::Place(Place::Text),
    "data" => Directive::Place(Place::Data),
    "byte" => Directive::Data(DataDirective::Byte),
    "half" => Directive::Data(DataDirective::Half),
    "word" => Directive::Data(DataDirective::Word),
    "dword" => Directive::Data(DataDirective::Dword),
    "float" => Directive::Data(DataDirective::Float),
    "double" => Directive::Data(DataDirective::Double),
    "ascii" => Directive::Data(DataDirective::Ascii),
    "asciz" => Directive::Data(DataDirective::Asciz),
    "global" => Directive::Global,
    "globl" => Directive::Global,
    "macro" => Directive::Macro,
    "end_macro" => Directive::EndMacro,
};

/// One input file.
#[derive(Debug, Clone, Copy)]
pub struct SourceFile<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

impl<'a> SourceFile<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }
}

/// A linked memory image ready to run.
#[derive(Debug, Clone)]
pub struct Program {
    ram: Ram,
    entry: WordType,
    text_len: usize,
    data_len: usize,
    globals: HashMap<String, AddrType>,
}

impl Program {
    /// Address of the global `main`, or the start of the text segment.
    pub fn entry(&self) -> WordType {
        self.entry
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn into_ram(self) -> Ram {
        self.ram
    }

    pub fn text_len(&self) -> usize {
        self.text_len
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    /// Address of an exported label.
    pub fn symbol(&self, name: &str) -> Option<AddrType> {
        self.globals.get(name).copied()
    }

    /// Every assembled instruction word with its address.
    pub fn words(&self) -> impl Iterator<Item = (AddrType, u32)> + '_ {
        (0..self.text_len as WordType).step_by(4).filter_map(|offset| {
            let addr = TEXT_BASE + offset;
            self.ram
                .read::<u32>(addr)
                .ok()
                .map(|raw| (addr as AddrType, raw))
        })
    }

    /// `address  word  disassembly`, one instruction per line.
    pub fn listing(&self) -> String {
        self.listing_with(Catalog::global())
    }

    pub fn listing_with(&self, catalog: &Catalog) -> String {
        self.words()
            .map(|(addr, raw)| {
                format!("{addr:#010x}  {raw:08x}  {}\n", disassemble_with(catalog, raw))
            })
            .collect()
    }
}

#[derive(Debug)]
struct Macro {
    params: Vec<String>,
    /// Raw body lines with their line numbers.
    body: Vec<(usize, String)>,
}

/// Labels, pending relocations, bound variables and macros visible to a block of lines.
#[derive(Debug, Default)]
struct Scope {
    labels: HashMap<String, AddrType>,
    relocs: Vec<Relocation>,
    vars: Vars,
    macros: HashMap<String, Rc<Macro>>,
}

/// Per-file assembler state, shared by every expansion inside the file.
#[derive(Debug)]
struct FileState<'f> {
    name: &'f str,
    place: Place,
    directive: DataDirective,
    /// `.global` declarations with the line declaring them.
    globals: Vec<(String, usize)>,
    depth: usize,
}

impl<'f> FileState<'f> {
    fn new(name: &'f str) -> Self {
        Self {
            name,
            place: Place::Text,
            directive: DataDirective::Word,
            globals: Vec::new(),
            depth: 0,
        }
    }

    fn error(&self, kind: AssemblyErrorKind, line: usize) -> AssemblyError {
        AssemblyError::new(kind, line, self.name)
    }
}

#[derive(Debug)]
struct PendingGlobal {
    name: String,
    line: usize,
    file: String,
}

/// Assembly context: the image being built, segment cursors and the link tables.
pub struct Assembler<'c> {
    catalog: &'c Catalog,
    ram: Ram,
    text_len: AddrType,
    data_len: AddrType,
    globals: HashMap<String, AddrType>,
    deferred: Vec<Relocation>,
    pending: Vec<PendingGlobal>,
}

impl Default for Assembler<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler<'static> {
    pub fn new() -> Self {
        Self::with_catalog(Catalog::global())
    }
}

/// Assembles and links `files` with the built-in instruction catalog.
pub fn assemble(files: &[SourceFile<'_>]) -> Result<Program, AssemblyError> {
    Assembler::new().assemble(files)
}

/// Name of the directive a line starts with, if any.
fn leading_directive<'t>(catalog: &'t Catalog, text: &'t str) -> Option<&'t str> {
    tokenize(text, catalog)
        .find(|t| !matches!(t.kind, TokenKind::Space))
        .filter(|t| matches!(t.kind, TokenKind::Directive))
        .map(|t| &t.text[1..])
}

fn macro_param(operand: Operand) -> KindResult<String> {
    match operand {
        Operand::Variable(name) => Ok(name),
        _ => Err(AssemblyErrorKind::MacroParameter),
    }
}

/// Arguments of a macro or fake instruction call, `name a, b` or `name(a, b)`.
fn call_args(
    reader: &mut LineReader<'_>,
    name: &str,
    expected: usize,
) -> KindResult<SmallVec<[Operand; 4]>> {
    let mut args: SmallVec<[Operand; 4]> = reader.rest()?.into_iter().collect();
    if let [Operand::Group(_)] = args.as_slice() {
        if let Some(Operand::Group(items)) = args.pop() {
            args = items.into_iter().collect();
        }
    }

    let found = args.len();
    let name = name.to_owned();
    match found.cmp(&expected) {
        std::cmp::Ordering::Greater => Err(AssemblyErrorKind::TooManyMacroArgs {
            name,
            expected,
            found,
        }),
        std::cmp::Ordering::Less => Err(AssemblyErrorKind::TooFewMacroArgs {
            name,
            expected,
            found,
        }),
        std::cmp::Ordering::Equal => Ok(args),
    }
}

fn directive(
    fs: &mut FileState<'_>,
    reader: &mut LineReader<'_>,
    name: &str,
    line: usize,
) -> KindResult<()> {
    match DIRECTIVES.get(name).copied() {
        None => Err(AssemblyErrorKind::UnknownDirective(name.to_owned())),
        Some(Directive::Place(place)) => {
            fs.place = place;
            Ok(())
        }
        Some(Directive::Data(data)) => {
            if fs.place == Place::Text {
                return Err(AssemblyErrorKind::DataDirectiveInText(name.to_owned()));
            }
            fs.directive = data;
            Ok(())
        }
        Some(Directive::Global) => {
            let labels = reader.rest()?;
            if labels.is_empty() {
                return Err(AssemblyErrorKind::GlobalWithoutLabel(name.to_owned()));
            }
            for label in labels {
                match label {
                    Operand::Symbol(label) => fs.globals.push((label, line)),
                    _ => return Err(AssemblyErrorKind::GlobalNonLabel(name.to_owned())),
                }
            }
            Ok(())
        }
        Some(Directive::Macro) => Err(AssemblyErrorKind::MisplacedMacro),
        Some(Directive::EndMacro) => Err(AssemblyErrorKind::StrayEndMacro),
    }
}

impl<'c> Assembler<'c> {
    pub fn with_catalog(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            ram: Ram::new(),
            text_len: 0,
            data_len: 0,
            globals: HashMap::new(),
            deferred: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Stack size of the produced image.
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.ram = self.ram.with_stack(stack_size);
        self
    }

    pub fn assemble(mut self, files: &[SourceFile<'_>]) -> Result<Program, AssemblyError> {
        for file in files {
            self.assemble_file(file)?;
        }
        self.link()
    }

    fn assemble_file(&mut self, file: &SourceFile<'_>) -> Result<(), AssemblyError> {
        let mut fs = FileState::new(file.name);
        let mut scope = Scope::default();
        let lines: Vec<(usize, &str)> = file
            .text
            .lines()
            .enumerate()
            .map(|(idx, text)| (idx + 1, text))
            .collect();

        self.assemble_block(&mut fs, &mut scope, &lines)?;

        for (name, line) in fs.globals {
            match scope.labels.get(&name) {
                Some(&address) => {
                    self.globals.insert(name, address);
                }
                None => self.pending.push(PendingGlobal {
                    name,
                    line,
                    file: file.name.to_owned(),
                }),
            }
        }

        let relocs = std::mem::take(&mut scope.relocs);
        let mut unresolved = Vec::new();
        self.resolve(relocs, &scope.labels, &mut unresolved)?;
        debug!(
            "{}: {} labels, {} relocations left for linking",
            file.name,
            scope.labels.len(),
            unresolved.len()
        );
        self.deferred.extend(unresolved);
        Ok(())
    }

    /// Resolves every exported label reference and hands out the image.
    fn link(mut self) -> Result<Program, AssemblyError> {
        let globals = std::mem::take(&mut self.globals);

        if let Some(pending) = self
            .pending
            .iter()
            .find(|pending| !globals.contains_key(&pending.name))
        {
            return Err(AssemblyError::new(
                AssemblyErrorKind::UnresolvedLabel(pending.name.clone()),
                pending.line,
                &pending.file,
            ));
        }

        let deferred = std::mem::take(&mut self.deferred);
        let mut unresolved = Vec::new();
        self.resolve(deferred, &globals, &mut unresolved)?;
        if let Some(reloc) = unresolved.first() {
            return Err(AssemblyError::new(
                AssemblyErrorKind::UnresolvedLabel(reloc.label.clone()),
                reloc.line,
                &reloc.file,
            ));
        }

        let entry = globals
            .get("main")
            .map_or(TEXT_BASE, |&addr| WordType::from(addr));
        info!(
            "assembled {} bytes of text, {} bytes of data, entry {:#010x}",
            self.text_len, self.data_len, entry
        );

        Ok(Program {
            ram: self.ram,
            entry,
            text_len: self.text_len as usize,
            data_len: self.data_len as usize,
            globals,
        })
    }

    /// Patches relocations whose label is in `labels` and collects the rest.
    fn resolve(
        &mut self,
        relocs: Vec<Relocation>,
        labels: &HashMap<String, AddrType>,
        unresolved: &mut Vec<Relocation>,
    ) -> Result<(), AssemblyError> {
        for reloc in relocs {
            match labels.get(&reloc.label) {
                Some(&target) => reloc
                    .apply(&mut self.ram, target)
                    .map_err(|kind| AssemblyError::new(kind, reloc.line, &reloc.file))?,
                None => unresolved.push(reloc),
            }
        }
        Ok(())
    }

    fn assemble_block(
        &mut self,
        fs: &mut FileState<'_>,
        scope: &mut Scope,
        lines: &[(usize, &str)],
    ) -> Result<(), AssemblyError> {
        let mut lines = lines.iter().copied();
        while let Some((line, text)) = lines.next() {
            if leading_directive(self.catalog, text) == Some("macro") {
                let (name, body) = self
                    .read_macro(text, &mut lines)
                    .map_err(|kind| fs.error(kind, line))?;
                debug!("{}:{}: macro `{}`", fs.name, line, name);
                scope.macros.insert(name, Rc::new(body));
                continue;
            }
            self.assemble_line(fs, scope, line, text)?;
        }
        Ok(())
    }

    /// Reads a `.macro name(%a, %b)` header and the body up to `.end_macro`.
    fn read_macro<'l>(
        &self,
        header: &str,
        lines: &mut impl Iterator<Item = (usize, &'l str)>,
    ) -> KindResult<(String, Macro)> {
        let mut reader = LineReader::new(tokenize(header, self.catalog), Vars::default());
        reader.next_operand()?;

        let name = match reader.next_operand()? {
            Some(Operand::Symbol(name)) => name,
            _ => return Err(AssemblyErrorKind::MacroName),
        };

        let mut params = Vec::new();
        for operand in reader.rest()? {
            match operand {
                Operand::Group(items) => {
                    for item in items {
                        params.push(macro_param(item)?);
                    }
                }
                other => params.push(macro_param(other)?),
            }
        }

        let mut body = Vec::new();
        for (line, text) in lines {
            if leading_directive(self.catalog, text) == Some("end_macro") {
                return Ok((name, Macro { params, body }));
            }
            body.push((line, text.to_owned()));
        }
        Err(AssemblyErrorKind::UnterminatedMacro)
    }

    fn assemble_line(
        &mut self,
        fs: &mut FileState<'_>,
        scope: &mut Scope,
        line: usize,
        text: &str,
    ) -> Result<(), AssemblyError> {
        let file = fs.name;
        let at = |kind| AssemblyError::new(kind, line, file);
        let mut reader = LineReader::new(tokenize(text, self.catalog), Rc::clone(&scope.vars));

        while let Some(operand) = reader.next_operand().map_err(at)? {
            match operand {
                Operand::Label(name) => {
                    let address = self.cursor(fs.place);
                    scope.labels.insert(name, address);
                }
                Operand::Directive(name) => directive(fs, &mut reader, &name, line).map_err(at)?,
                Operand::Instruction(name) => {
                    return self.instruction(fs, scope, &mut reader, &name, line);
                }
                Operand::Symbol(name) if scope.macros.contains_key(&name) => {
                    return self.call_macro(fs, scope, &mut reader, &name, line);
                }
                Operand::Register(reg) => {
                    let name = match reg.class {
                        RegClass::Int => self.catalog.int_reg_name(reg.index),
                        RegClass::Float => self.catalog.float_reg_name(reg.index),
                    };
                    return Err(at(AssemblyErrorKind::LoneRegister(name.to_owned())));
                }
                Operand::Variable(name) => {
                    return Err(at(AssemblyErrorKind::UnboundVariable(name)));
                }
                Operand::Group(_) => return Err(at(AssemblyErrorKind::StrayParenthesis)),
                data => self.place_data(fs, scope, data, line).map_err(at)?,
            }
        }
        Ok(())
    }

    fn call_macro(
        &mut self,
        fs: &mut FileState<'_>,
        scope: &mut Scope,
        reader: &mut LineReader<'_>,
        name: &str,
        line: usize,
    ) -> Result<(), AssemblyError> {
        let Some(mac) = scope.macros.get(name).cloned() else {
            unreachable!("`{name}` was checked to be a macro");
        };
        let args = call_args(reader, name, mac.params.len()).map_err(|kind| fs.error(kind, line))?;

        let vars = mac.params.iter().cloned().zip(args).collect();
        let body: Vec<(usize, &str)> = mac.body.iter().map(|(n, text)| (*n, text.as_str())).collect();
        self.expand(fs, scope, vars, &body, line, true)
    }

    /// Assembles `body` in a child scope.
    ///
    /// Labels defined inside stay local to the expansion; relocations they do not resolve move
    /// up to `scope`. With `traced` set, errors get a trace frame for the call site.
    fn expand(
        &mut self,
        fs: &mut FileState<'_>,
        scope: &mut Scope,
        vars: HashMap<String, Operand>,
        body: &[(usize, &str)],
        call_line: usize,
        traced: bool,
    ) -> Result<(), AssemblyError> {
        if fs.depth >= MAX_EXPANSION_DEPTH {
            return Err(fs.error(
                AssemblyErrorKind::ExpansionTooDeep(MAX_EXPANSION_DEPTH),
                call_line,
            ));
        }

        let mut child = Scope {
            labels: HashMap::new(),
            relocs: Vec::new(),
            vars: Rc::new(vars),
            macros: scope.macros.clone(),
        };
        let (place, data) = (fs.place, fs.directive);
        fs.depth += 1;

        let mut result = self.assemble_block(fs, &mut child, body);
        if result.is_ok() {
            let relocs = std::mem::take(&mut child.relocs);
            result = self.resolve(relocs, &child.labels, &mut scope.relocs);
        }

        fs.depth -= 1;
        fs.place = place;
        fs.directive = data;

        result.map_err(|mut err| {
            if traced {
                err.add_trace(call_line, fs.name);
            }
            err
        })
    }

    fn cursor(&self, place: Place) -> AddrType {
        match place {
            Place::Text => TEXT_BASE as AddrType + self.text_len,
            Place::Data => DATA_BASE as AddrType + self.data_len,
        }
    }

    /// Claims `width` bytes at the cursor of `place`.
    fn reserve(&mut self, place: Place, width: usize) -> KindResult<AddrType> {
        let address = self.cursor(place);
        let len = match place {
            Place::Text => &mut self.text_len,
            Place::Data => &mut self.data_len,
        };
        if *len as usize + width > SEGMENT_SIZE {
            return Err(AssemblyErrorKind::SegmentOverflow(place.name()));
        }
        *len += width as AddrType;
        Ok(address)
    }

    fn put<T: MemValue>(&mut self, place: Place, value: T) -> KindResult<AddrType> {
        let address = self.reserve(place, T::SIZE)?;
        self.ram
            .write(WordType::from(address), value)
            .map_err(|_| AssemblyErrorKind::SegmentOverflow(place.name()))?;
        Ok(address)
    }

    fn put_bytes(&mut self, place: Place, bytes: &[u8]) -> KindResult<()> {
        let address = self.reserve(place, bytes.len())?;
        self.ram
            .insert_section(bytes, WordType::from(address))
            .map_err(|_| AssemblyErrorKind::SegmentOverflow(place.name()))
    }

    fn place_data(
        &mut self,
        fs: &FileState<'_>,
        scope: &mut Scope,
        operand: Operand,
        line: usize,
    ) -> KindResult<()> {
        use DataDirective as D;

        let place = fs.place;
        if place == Place::Text {
            return Err(AssemblyErrorKind::DataInText(operand.render()));
        }

        match (fs.directive, operand) {
            (D::Ascii, Operand::Str(s)) => self.put_bytes(place, s.as_bytes()),
            (D::Asciz, Operand::Str(s)) => {
                self.put_bytes(place, s.as_bytes())?;
                self.put(place, 0u8).map(drop)
            }
            (D::Ascii | D::Asciz, other) => Err(AssemblyErrorKind::NotAString(other.describe())),
            (_, Operand::Str(_)) => Err(AssemblyErrorKind::StringOutsideDirective),

            (D::Float, Operand::Float(v)) => self.put(place, v as f32).map(drop),
            (D::Double, Operand::Float(v)) => self.put(place, v).map(drop),
            (_, Operand::Float(_)) => Err(AssemblyErrorKind::WrongDirectiveFloat),

            (D::Byte, Operand::Int(v)) => self.put(place, v as u8).map(drop),
            (D::Half, Operand::Int(v)) => self.put(place, v as u16).map(drop),
            (D::Word, Operand::Int(v)) => self.put(place, v as u32).map(drop),
            (D::Dword, Operand::Int(v)) => self.put(place, v as u64).map(drop),
            (D::Float, Operand::Int(v)) => self.put(place, v as f32).map(drop),
            (D::Double, Operand::Int(v)) => self.put(place, v as f64).map(drop),

            (D::Float | D::Double, Operand::Symbol(_)) => Err(AssemblyErrorKind::LabelCantFloat),
            (data, Operand::Symbol(label)) => {
                let (kind, width) = match data {
                    D::Byte => (RelocKind::Byte, 1),
                    D::Half => (RelocKind::Half, 2),
                    D::Dword => (RelocKind::Dword, 8),
                    _ => (RelocKind::Word, 4),
                };
                let address = self.reserve(place, width)?;
                scope.relocs.push(Relocation {
                    address,
                    label,
                    kind,
                    line,
                    file: fs.name.to_owned(),
                });
                Ok(())
            }

            (_, other) => unreachable!("{} is not data", other.describe()),
        }
    }
}
