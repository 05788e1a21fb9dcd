use super::*;
use crate::isa::riscv::decoder::decode;

fn assemble_one(src: &str) -> Result<Program, AssemblyError> {
    assemble(&[SourceFile::new("main.s", src)])
}

fn program(src: &str) -> Program {
    assemble_one(src).unwrap()
}

fn error(src: &str) -> AssemblyError {
    assemble_one(src).unwrap_err()
}

fn kind(src: &str) -> AssemblyErrorKind {
    error(src).kind
}

fn words(program: &Program) -> Vec<u32> {
    program.words().map(|(_, raw)| raw).collect()
}

fn imm(raw: u32) -> i64 {
    decode(raw).unwrap().imm as i64
}

/// Address an `auipc` at `index` plus the low part after it point at.
fn pair_target(program: &Program, index: usize) -> i64 {
    let words = words(program);
    TEXT_BASE as i64 + 4 * index as i64 + imm(words[index]) + imm(words[index + 1])
}

#[test]
fn test_li_small_and_large() {
    let p = program("li t0, 5");
    assert_eq!(words(&p), vec![0x0050_0293]);
    assert_eq!(p.text_len(), 4);

    // lui t0, 0x1 ; addi t0, t0, 0x388
    let p = program("li t0, 5000");
    assert_eq!(words(&p), vec![0x0000_12b7, 0x3882_8293]);


    for (src, expected) in [
        // lui t0, 0xfffff ; addi t0, t0, -904
        ("li t0, -5000", [0xffff_f2b7, 0xc782_8293]),
        // lui t0, 0x7ffff ; addi t0, t0, 0x7ff
        ("li t0, 0x7ffff7ff", [0x7fff_f2b7, 0x7ff2_8293]),
        // lui t0, 0x80000 ; addiw t0, t0, -1
        ("li t0, 0x7fffffff", [0x8000_02b7, 0xfff2_829b]),
        // lui t0, 0x80000 ; addi t0, t0, 0
        ("li t0, -0x80000000", [0x8000_02b7, 0x0002_8293]),
    ] {
        assert_eq!(words(&program(src)), expected, "{src}");
    }
    assert_eq!(kind("li t0, -0x80000001"), AssemblyErrorKind::LiOutOfRange(-0x8000_0001));

    assert_eq!(kind("li t0, 0x100000000"), AssemblyErrorKind::LiOutOfRange(0x1_0000_0000));
}

#[test]
fn test_register_forms() {
    let p = program(
        "add a0, a1, a2\n\
         addi a0, zero, -1\n\
         lw a0, 4(sp)\n\
         sw a5, -36(s0)\n\
         lw a0, (sp)\n\
         lui gp, 0x12345\n\
         srai t0, t1, 4\n\
         ecall",
    );
    assert_eq!(
        words(&p),
        vec![
            0x00c5_8533,
            0xfff0_0513,
            0x0041_2503,
            0xfcf4_2e23,
            0x0001_2503,
            0x1234_51b7,
            0x4043_5293,
            0x0000_0073,
        ]
    );
}

#[test]
fn test_operand_errors() {
    assert_eq!(kind("addi a0, a0, 4096"), AssemblyErrorKind::OutOfRange12Bit(4096));
    assert_eq!(kind("slli a0, a0, 32"), AssemblyErrorKind::OutOfRange5Bit(32));
    assert_eq!(kind("lui a0, 524288"), AssemblyErrorKind::OutOfRange20Bit(524288));
    assert_eq!(kind("lw a0, 4096(sp)"), AssemblyErrorKind::OutOfRangeOffset(4096));
    assert_eq!(kind("sw a0, 4096"), AssemblyErrorKind::OutOfRangeOffset(4096));
    assert_eq!(kind("lw a0, (sp, t0)"), AssemblyErrorKind::TooManyInParens);
    assert_eq!(kind("lw a0, ()"), AssemblyErrorKind::TooFewInParens);
    assert_eq!(kind("add a0, a1"), AssemblyErrorKind::TooFewArguments);
    assert_eq!(kind("add a0, a1, a2, a3"), AssemblyErrorKind::TooManyArguments);
    assert_eq!(kind("add a0, a1, ft0"), AssemblyErrorKind::ExpectedIntRegister);
    assert_eq!(kind("beq a0, a1, 8"), AssemblyErrorKind::ExpectedLabel("an integer"));
    assert_eq!(kind("lui a0, a1"), AssemblyErrorKind::UOperandType);
    assert_eq!(kind("a0"), AssemblyErrorKind::LoneRegister("a0".into()));
    assert_eq!(kind("%x"), AssemblyErrorKind::UnboundVariable("x".into()));
    assert_eq!(
        kind("mv a0"),
        AssemblyErrorKind::TooFewMacroArgs {
            name: "mv".into(),
            expected: 2,
            found: 1
        }
    );
}

#[test]
fn test_error_lines_are_one_based() {
    let err = error("nop\n\n  addi a0, a0, 9999 # too big\n");
    assert_eq!(err.line, 3);
    assert_eq!(err.file, "main.s");
    assert!(err.trace.is_empty());
    assert_eq!(err.to_string(), "main.s:3: 9999 does not fit in 12 bits");
}

#[test]
fn test_branches_and_jumps() {
    let p = program(
        "main:\n\
         beq a0, a1, end\n\
         addi a0, a0, 1\n\
         j main\n\
         end:\n\
         ecall",
    );
    let w = words(&p);
    assert_eq!(imm(w[0]), 12);
    assert_eq!(imm(w[2]), -8);
    // j expands to jal zero
    assert_eq!(decode(w[2]).unwrap().rd, 0);
}

#[test]
fn test_evil_jump() {
    let err = error(".data\n.byte 1\nodd: .byte 2\n.text\nj odd");
    assert_eq!(err.kind, AssemblyErrorKind::EvilJump);
    assert_eq!(err.line, 5);
}

#[test]
fn test_data_layout() {
    let p = program(
        ".data\n\
         .byte 1, 0x1ff\n\
         .half 0x1234\n\
         .word -1\n\
         .asciz \"ab\"\n\
         .ascii \"c\"\n\
         .byte 'A'\n",
    );
    let ram = p.ram();
    assert_eq!(ram.read::<u8>(DATA_BASE).unwrap(), 1);
    assert_eq!(ram.read::<u8>(DATA_BASE + 1).unwrap(), 0xff);
    assert_eq!(ram.read::<u16>(DATA_BASE + 2).unwrap(), 0x1234);
    assert_eq!(ram.read::<u32>(DATA_BASE + 4).unwrap(), 0xffff_ffff);
    assert_eq!(ram.read_c_string(DATA_BASE + 8).unwrap(), b"ab");
    assert_eq!(ram.read::<u8>(DATA_BASE + 10).unwrap(), 0);
    assert_eq!(ram.read::<u8>(DATA_BASE + 11).unwrap(), b'c');
    assert_eq!(ram.read::<u8>(DATA_BASE + 12).unwrap(), b'A');
    assert_eq!(p.data_len(), 13);
}

#[test]
fn test_default_directive_is_word() {
    let p = program(".data\n5 6");
    assert_eq!(p.ram().read::<u32>(DATA_BASE).unwrap(), 5);
    assert_eq!(p.ram().read::<u32>(DATA_BASE + 4).unwrap(), 6);
}

#[test]
fn test_float_data() {
    let p = program(".data\n.float 1.5\n.double 2\n.float -Infinity");
    let ram = p.ram();
    assert_eq!(ram.read::<f32>(DATA_BASE).unwrap(), 1.5);
    assert_eq!(ram.read::<f64>(DATA_BASE + 4).unwrap(), 2.0);
    assert_eq!(ram.read::<f32>(DATA_BASE + 12).unwrap(), f32::NEG_INFINITY);
}

#[test]
fn test_data_errors() {
    assert_eq!(
        kind(".word 1"),
        AssemblyErrorKind::DataDirectiveInText("word".into())
    );
    assert_eq!(kind("5"), AssemblyErrorKind::DataInText("5".into()));
    assert_eq!(kind(".data\n.asciz 5"), AssemblyErrorKind::NotAString("an integer"));
    assert_eq!(kind(".data\n\"x\""), AssemblyErrorKind::StringOutsideDirective);
    assert_eq!(kind(".data\n.word 1.5"), AssemblyErrorKind::WrongDirectiveFloat);
    assert_eq!(kind(".data\n.float here"), AssemblyErrorKind::LabelCantFloat);
    assert_eq!(kind(".bogus"), AssemblyErrorKind::UnknownDirective("bogus".into()));
    assert_eq!(kind(".data\n\"open"), AssemblyErrorKind::InvalidString);
    assert_eq!(kind(".global"), AssemblyErrorKind::GlobalWithoutLabel("global".into()));
    assert_eq!(kind(".globl 5"), AssemblyErrorKind::GlobalNonLabel("globl".into()));
}

#[test]
fn test_label_words_are_relocated() {
    let p = program(
        ".data\n\
         ptr: .word target\n\
         small: .half target\n\
         wide: .dword target\n\
         .text\n\
         nop\n\
         target: nop",
    );
    let ram = p.ram();
    let target = TEXT_BASE + 4;
    assert_eq!(ram.read::<u32>(DATA_BASE).unwrap() as WordType, target);
    assert_eq!(ram.read::<u16>(DATA_BASE + 4).unwrap(), target as u16);
    assert_eq!(ram.read::<u64>(DATA_BASE + 6).unwrap(), target);
}

#[test]
fn test_la_and_label_memory_operands() {
    let p = program(
        ".data\n\
         .word 0\n\
         v: .word 7\n\
         .text\n\
         la a0, v\n\
         lw a1, v\n\
         sw a1, v, t0",
    );
    let target = (DATA_BASE + 4) as i64;
    assert_eq!(pair_target(&p, 0), target);
    assert_eq!(pair_target(&p, 2), target);
    assert_eq!(pair_target(&p, 4), target);

    let w = words(&p);
    // lw loads through its own destination, sw through the temporary
    assert_eq!(decode(w[2]).unwrap().rd, 11);
    assert_eq!(decode(w[3]).unwrap().rs1, 11);
    assert_eq!(decode(w[4]).unwrap().rd, 5);
    assert_eq!(decode(w[5]).unwrap().rs1, 5);

    assert_eq!(kind(".data\nv: .word 0\n.text\nsw a1, v"), AssemblyErrorKind::TooFewArguments);
}

#[test]
fn test_lui_with_modifier() {
    let p = program(".data\nmsg: .asciz \"hi\"\n.text\nlui a0, %hi(msg)\nauipc a1, msg");
    let w = words(&p);
    assert_eq!(w[0], 0x1001_0537);
    // auipc alone keeps the rounding meant for a following low part
    let offset = DATA_BASE as i64 - (TEXT_BASE as i64 + 4);
    assert_eq!(imm(w[1]), (offset + 0x800) & !0xfff);
}

#[test]
fn test_duplicate_label_last_wins() {
    let p = program(
        ".data\n\
         x: .word 1\n\
         x: .word 2\n\
         .text\n\
         la a0, x",
    );
    assert_eq!(pair_target(&p, 0), (DATA_BASE + 4) as i64);
}

#[test]
fn test_macro_expansion() {
    let p = program(
        ".macro push(%r)\n\
         addi sp, sp, -4\n\
         sw %r, 0(sp)\n\
         .end_macro\n\
         push(a0)\n\
         push a1",
    );
    let w = words(&p);
    assert_eq!(w.len(), 4);
    assert_eq!(w[1], 0x00a1_2023);
    assert_eq!(decode(w[3]).unwrap().rs2, 11);
}

#[test]
fn test_macro_labels_stay_local() {
    let p = program(
        ".macro spin\n\
         loop: j loop\n\
         .end_macro\n\
         spin\n\
         spin",
    );
    // jal zero, 0 twice
    assert_eq!(words(&p), vec![0x6f, 0x6f]);

    let err = error(".macro spin\nloop: j loop\n.end_macro\nspin\nj loop");
    assert_eq!(err.kind, AssemblyErrorKind::UnresolvedLabel("loop".into()));
    assert_eq!(err.line, 5);
}

#[test]
fn test_macro_reaches_caller_labels() {
    let p = program(
        ".macro go(%target)\n\
         j %target\n\
         .end_macro\n\
         go(end)\n\
         nop\n\
         end: ecall",
    );
    assert_eq!(imm(words(&p)[0]), 8);
}

#[test]
fn test_macro_errors_carry_trace() {
    let err = error(
        ".macro bad(%x)\n\
         addi %x, %x, 5000\n\
         .end_macro\n\
         .macro outer\n\
         bad(a0)\n\
         .end_macro\n\
         nop\n\
         outer",
    );
    assert_eq!(err.kind, AssemblyErrorKind::OutOfRange12Bit(5000));
    assert_eq!(err.line, 2);
    assert_eq!(
        err.trace,
        vec![
            TraceFrame {
                line: 5,
                file: "main.s".into()
            },
            TraceFrame {
                line: 8,
                file: "main.s".into()
            },
        ]
    );
}

#[test]
fn test_macro_definition_errors() {
    assert_eq!(
        kind(".macro push(%r)\naddi sp, sp, -4\n\npush(a0, a1)"),
        AssemblyErrorKind::UnterminatedMacro
    );
    assert_eq!(error(".macro m\nnop").line, 1);
    assert_eq!(
        kind(".macro two(%a, %b)\nnop\n.end_macro\ntwo(a0, a1, a2)"),
        AssemblyErrorKind::TooManyMacroArgs {
            name: "two".into(),
            expected: 2,
            found: 3
        }
    );
    assert_eq!(kind(".macro 5\n.end_macro"), AssemblyErrorKind::MacroName);
    assert_eq!(kind(".macro m(a0)\n.end_macro"), AssemblyErrorKind::MacroParameter);
    assert_eq!(kind(".end_macro"), AssemblyErrorKind::StrayEndMacro);
    assert_eq!(kind("nop\n main: .macro m"), AssemblyErrorKind::MisplacedMacro);
}

#[test]
fn test_recursive_macro_is_reported() {
    assert_eq!(
        kind(".macro forever\nforever\n.end_macro\nforever"),
        AssemblyErrorKind::ExpansionTooDeep(MAX_EXPANSION_DEPTH)
    );
}

#[test]
fn test_multi_file_linking() {
    let main = "\
        .global main\n\
        main:\n\
        call helper\n\
        li a7, 10\n\
        ecall\n";
    let lib = "\
        .globl helper\n\
        helper:\n\
        ret\n\
        private: ret\n";

    let p = assemble(&[SourceFile::new("main.s", main), SourceFile::new("lib.s", lib)]).unwrap();
    assert_eq!(p.entry(), TEXT_BASE);
    assert_eq!(p.symbol("helper"), Some(TEXT_BASE as AddrType + 12));
    assert_eq!(p.symbol("private"), None);
    assert_eq!(imm(words(&p)[0]), 12);

    let err = assemble(&[
        SourceFile::new("main.s", "call private"),
        SourceFile::new("lib.s", lib),
    ])
    .unwrap_err();
    assert_eq!(err.kind, AssemblyErrorKind::UnresolvedLabel("private".into()));
    assert_eq!(err.file, "main.s");
}

#[test]
fn test_globals_resolve_in_either_file_order() {
    // (main.s, lib.s, symbol, its offset in text, index of the jump using it, jump offset)
    let cases = [
        ("call helper\nli a7, 10\necall", ".globl helper\nhelper: ret", "helper", 12, 0, 12),
        (".global helper\ncall helper", ".globl helper\nhelper: ret", "helper", 4, 0, 4),
        ("nop\ncall helper", "helper: ret\n.globl helper", "helper", 8, 1, 4),
        (".globl main\nmain: nop", "nop\nj main", "main", 0, 2, -8),
    ];

    for (main, lib, symbol, offset, index, jump) in cases {
        let p = assemble(&[SourceFile::new("main.s", main), SourceFile::new("lib.s", lib)])
            .unwrap_or_else(|e| panic!("{main:?} + {lib:?}: {e}"));
        assert_eq!(p.symbol(symbol), Some(TEXT_BASE as AddrType + offset), "{main:?}");
        assert_eq!(imm(words(&p)[index]), jump, "{main:?}");
    }

    let p = assemble(&[
        SourceFile::new("main.s", "la a0, msg"),
        SourceFile::new("lib.s", ".data\n.word 0\n.globl msg\nmsg: .asciz \"x\""),
    ])
    .unwrap();
    assert_eq!(pair_target(&p, 0), DATA_BASE as i64 + 4);
}

#[test]
fn test_data_is_packed_without_alignment() {
    // (source, address of the word, expected bytes from DATA_BASE)
    let cases: [(&str, u64, &[u8]); 3] = [
        (".asciz \"hi\"\n.word 1", 3, b"hi\0\x01\0\0\0"),
        (".byte 7\n.half 0x0102", 1, b"\x07\x02\x01"),
        (".ascii \"abc\"\n.word -1", 3, b"abc\xff\xff\xff\xff"),
    ];

    for (src, word_at, bytes) in cases {
        let p = program(&format!(".data\n{src}"));
        let ram = p.ram();
        let laid_out: Vec<u8> = (0..bytes.len() as u64)
            .map(|i| ram.read::<u8>(DATA_BASE + i).unwrap())
            .collect();
        assert_eq!(laid_out, bytes, "{src}");
        assert_eq!(p.data_len(), bytes.len(), "{src}");
        assert_ne!(ram.read::<u8>(DATA_BASE + word_at).unwrap(), 0, "{src}");
    }
}

#[test]
fn test_global_declared_but_never_defined() {
    let err = error(".global main\nnop");
    assert_eq!(err.kind, AssemblyErrorKind::UnresolvedLabel("main".into()));
    assert_eq!(err.line, 1);
}

#[test]
fn test_entry_point() {
    assert_eq!(program("nop").entry(), TEXT_BASE);
    assert_eq!(program("nop\n.global main\nmain: nop").entry(), TEXT_BASE + 4);
}

#[test]
fn test_listing() {
    let p = program("add a0, a1, a2\necall");
    assert_eq!(
        p.listing(),
        "0x00400000  00c58533  add a0,a1,a2\n0x00400004  00000073  ecall\n"
    );
}
