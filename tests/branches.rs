//! Jump widening and switch routing, checked on the serialized class

mod common;

use classfile_assembler::jvm::code::decode::{decode_code, DecodedInstruction};
use classfile_assembler::jvm::code::{BranchInstruction, Instruction, Label, OrdComparison};
use classfile_assembler::jvm::{
    AssemblerSettings, BinaryName, ClassAccessFlags, ClassAssembler, Error, ErrorKind, FieldType,
    MethodAccessFlags, MethodAssembler, MethodDescriptor, Name, UnqualifiedName,
};
use common::ParsedClass;

fn new_class() -> ClassAssembler {
    ClassAssembler::new(
        BinaryName::from_string(String::from("demo/Branches")).unwrap(),
        Some(BinaryName::OBJECT),
        vec![],
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        AssemblerSettings::default(),
    )
    .unwrap()
}

/// Open `static int name(int)`
fn open<'a>(class: &'a mut ClassAssembler, name: &str) -> MethodAssembler<'a> {
    class
        .open_method(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_string(name.to_owned()).unwrap(),
            MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::int()),
            },
        )
        .unwrap()
}

fn nops(code: &mut MethodAssembler<'_>, count: usize) {
    for _ in 0..count {
        code.emit(Instruction::Nop).unwrap();
    }
}

/// `bipush value; ireturn`
fn return_int(code: &mut MethodAssembler<'_>, value: i8) {
    code.emit(Instruction::BiPush(value)).unwrap();
    code.emit_branch(BranchInstruction::IReturn).unwrap();
}

/// Decoded body of the only method in the class
fn decoded_body(class: ClassAssembler, name: &str) -> Vec<(usize, DecodedInstruction)> {
    let parsed = ParsedClass::parse(&class.to_bytes().unwrap()).unwrap();
    decode_code(&parsed.code(name).code).unwrap()
}

fn at(decoded: &[(usize, DecodedInstruction)], offset: usize) -> &DecodedInstruction {
    decoded
        .iter()
        .find(|(at, _)| *at == offset)
        .map(|(_, insn)| insn)
        .unwrap_or_else(|| panic!("no instruction starts at {}", offset))
}

/// Value pushed by the `bipush` that a switch sends `key` to
fn route(decoded: &[(usize, DecodedInstruction)], switch: &DecodedInstruction, key: i32) -> i32 {
    let target = switch.switch_target(key).unwrap();
    match at(decoded, target) {
        DecodedInstruction::Immediate(0x10, value) => *value,
        other => panic!("key {} lands on {:?}", key, other),
    }
}

#[test]
fn forward_goto_is_widened_past_short_range() {
    common::init_logging();

    for (nop_count, expected_opcode) in [(32764, 0xa7), (32765, 0xc8)] {
        let mut class = new_class();
        let mut code = open(&mut class, "f");
        let end = code.fresh_label();
        code.emit_branch(BranchInstruction::Goto(end)).unwrap();
        nops(&mut code, nop_count);
        code.mark_label(end).unwrap();
        return_int(&mut code, 1);
        code.close(0).unwrap();

        let decoded = decoded_body(class, "f");
        let (end_offset, _) = decoded[decoded.len() - 2];
        assert_eq!(
            decoded[0],
            (0, DecodedInstruction::Jump(expected_opcode, end_offset))
        );
        assert_eq!(at(&decoded, end_offset), &DecodedInstruction::Immediate(0x10, 1));
    }
}

#[test]
fn forward_conditional_is_inverted_around_goto_w() {
    let mut class = new_class();
    let mut code = open(&mut class, "f");
    let far = code.fresh_label();
    code.emit(Instruction::ILoad(0)).unwrap();
    code.emit_branch(BranchInstruction::If(OrdComparison::NE, far))
        .unwrap();
    return_int(&mut code, 0);
    nops(&mut code, 40_000);
    code.mark_label(far).unwrap();
    return_int(&mut code, 1);
    code.close(0).unwrap();

    let decoded = decoded_body(class, "f");
    let far_offset = 1 + 8 + 3 + 40_000;
    assert_eq!(
        &decoded[..4],
        &[
            (0, DecodedInstruction::Local(0x15, 0)),
            (1, DecodedInstruction::Jump(0x99, 9)),
            (4, DecodedInstruction::Jump(0xc8, far_offset)),
            (9, DecodedInstruction::Immediate(0x10, 0)),
        ]
    );
    assert_eq!(at(&decoded, far_offset), &DecodedInstruction::Immediate(0x10, 1));
}

#[test]
fn backward_conditional_is_widened() {
    let mut class = new_class();
    let mut code = open(&mut class, "f");
    let top = code.fresh_label();
    code.mark_label(top).unwrap();
    nops(&mut code, 40_000);
    code.emit(Instruction::ILoad(0)).unwrap();
    code.emit_branch(BranchInstruction::If(OrdComparison::LT, top))
        .unwrap();
    return_int(&mut code, 2);
    code.close(0).unwrap();

    let decoded = decoded_body(class, "f");
    let tail = &decoded[decoded.len() - 5..];
    assert_eq!(
        tail,
        &[
            (40_000, DecodedInstruction::Local(0x15, 0)),
            (40_001, DecodedInstruction::Jump(0x9c, 40_009)),
            (40_004, DecodedInstruction::Jump(0xc8, 0)),
            (40_009, DecodedInstruction::Immediate(0x10, 2)),
            (40_011, DecodedInstruction::Plain(0xac)),
        ]
    );
}

#[test]
fn dense_switch_routes_gaps_and_misses_to_default() {
    let mut class = new_class();
    let mut code = open(&mut class, "f");
    code.emit(Instruction::ILoad(0)).unwrap();
    let switch = code.table_switch(0, 2).unwrap();
    for key in 0..=2 {
        code.mark_switch_case(switch, key).unwrap();
        return_int(&mut code, 10 + key as i8);
    }
    code.mark_switch_default(switch).unwrap();
    return_int(&mut code, 99);
    code.close(0).unwrap();

    let decoded = decoded_body(class, "f");
    let switch = &decoded[1].1;
    assert!(matches!(switch, DecodedInstruction::TableSwitch { low: 0, targets, .. } if targets.len() == 3));
    assert_eq!(route(&decoded, switch, 0), 10);
    assert_eq!(route(&decoded, switch, 1), 11);
    assert_eq!(route(&decoded, switch, 2), 12);
    assert_eq!(route(&decoded, switch, 30), 99);
    assert_eq!(route(&decoded, switch, -1), 99);
}

#[test]
fn dense_switch_with_unset_keys() {
    let mut class = new_class();
    let mut code = open(&mut class, "f");
    let first = code.fresh_label();
    let last = code.fresh_label();
    code.emit(Instruction::ILoad(0)).unwrap();
    let switch = code.table_switch(-10, 10).unwrap();
    code.switch_case(switch, 10, last).unwrap();
    code.switch_case(switch, -10, first).unwrap();
    code.mark_switch_default(switch).unwrap();
    return_int(&mut code, 0);
    code.mark_label(first).unwrap();
    return_int(&mut code, 1);
    code.mark_label(last).unwrap();
    return_int(&mut code, 2);
    code.close(0).unwrap();

    let decoded = decoded_body(class, "f");
    let switch = &decoded[1].1;
    assert_eq!(route(&decoded, switch, -10), 1);
    assert_eq!(route(&decoded, switch, 10), 2);
    for key in -9..=9 {
        assert_eq!(route(&decoded, switch, key), 0);
    }
}

#[test]
fn sparse_switch_sorts_keys() {
    let mut class = new_class();
    let mut code = open(&mut class, "f");
    let cases: Vec<(i32, Label)> = vec![3, -1, 1]
        .into_iter()
        .map(|key| (key, code.fresh_label()))
        .collect();
    code.emit(Instruction::ILoad(0)).unwrap();
    let switch = code.lookup_switch(3).unwrap();
    for (key, label) in &cases {
        code.switch_case(switch, *key, *label).unwrap();
    }
    code.mark_switch_default(switch).unwrap();
    return_int(&mut code, 0);
    for (key, label) in &cases {
        code.mark_label(*label).unwrap();
        return_int(&mut code, 100 + *key as i8);
    }
    code.close(0).unwrap();

    let decoded = decoded_body(class, "f");
    let switch = &decoded[1].1;
    match switch {
        DecodedInstruction::LookupSwitch { pairs, .. } => {
            let keys: Vec<i32> = pairs.iter().map(|(key, _)| *key).collect();
            assert_eq!(keys, vec![-1, 1, 3]);
        }
        other => panic!("expected lookupswitch, found {:?}", other),
    }
    assert_eq!(route(&decoded, switch, -1), 99);
    assert_eq!(route(&decoded, switch, 1), 101);
    assert_eq!(route(&decoded, switch, 3), 103);
    for miss in [0, 2, 4] {
        assert_eq!(route(&decoded, switch, miss), 0);
    }
}

#[test]
fn switch_padding_follows_widening() {
    let mut class = new_class();
    let mut code = open(&mut class, "f");
    let far = code.fresh_label();
    code.emit(Instruction::ILoad(0)).unwrap();
    code.emit_branch(BranchInstruction::If(OrdComparison::NE, far))
        .unwrap();
    code.emit(Instruction::ILoad(0)).unwrap();
    let switch = code.table_switch(1, 2).unwrap();
    code.mark_switch_case(switch, 1).unwrap();
    return_int(&mut code, 1);
    code.mark_switch_case(switch, 2).unwrap();
    return_int(&mut code, 2);
    code.mark_switch_default(switch).unwrap();
    return_int(&mut code, 3);
    nops(&mut code, 40_000);
    code.mark_label(far).unwrap();
    return_int(&mut code, 4);
    code.close(0).unwrap();

    let decoded = decoded_body(class, "f");

    // The widened conditional pushes the switch from offset 5 to offset 10
    let (switch_offset, switch) = &decoded[4];
    assert_eq!(*switch_offset, 10);
    assert_eq!(route(&decoded, switch, 1), 1);
    assert_eq!(route(&decoded, switch, 2), 2);
    assert_eq!(route(&decoded, switch, 7), 3);
}

#[test]
fn caller_protocol_errors() {
    let mut class = new_class();

    let mut code = open(&mut class, "twice");
    let label = code.fresh_label();
    code.mark_label(label).unwrap();
    let err = code.mark_label(label).unwrap_err();
    assert!(matches!(err, Error::DuplicateLabel { .. }));
    assert_eq!(err.kind(), ErrorKind::CallerProtocol);

    let mut code = open(&mut class, "unmarked");
    let label = code.fresh_label();
    code.emit_branch(BranchInstruction::Goto(label)).unwrap();
    match code.close(0) {
        Err(Error::UnmarkedLabels { method, labels }) => {
            assert_eq!(method, "unmarked(I)I");
            assert_eq!(labels, vec![label]);
        }
        other => panic!("expected unmarked labels, got {:?}", other),
    }

    let mut code = open(&mut class, "switch");
    code.emit(Instruction::ILoad(0)).unwrap();
    let switch = code.lookup_switch(2).unwrap();
    code.mark_switch_case(switch, 5).unwrap();
    let err = code.mark_switch_case(switch, 5).unwrap_err();
    assert!(matches!(err, Error::DuplicateSwitchCase { value: 5, .. }));
    assert_eq!(err.kind(), ErrorKind::CallerProtocol);

    let mut code = open(&mut class, "dense");
    code.emit(Instruction::ILoad(0)).unwrap();
    let switch = code.table_switch(0, 3).unwrap();
    let err = code.mark_switch_case(switch, 4).unwrap_err();
    assert!(matches!(err, Error::SwitchCaseOutOfRange { value: 4, .. }));
}

#[test]
fn labels_and_switches_stay_in_their_method() {
    let mut class = new_class();

    let mut code = open(&mut class, "first");
    let first_label = code.fresh_label();
    code.emit(Instruction::ILoad(0)).unwrap();
    let first_switch = code.lookup_switch(1).unwrap();
    code.switch_case(first_switch, 1, first_label).unwrap();
    code.mark_switch_default(first_switch).unwrap();
    return_int(&mut code, 0);
    code.mark_label(first_label).unwrap();
    return_int(&mut code, 1);
    code.close(0).unwrap();

    // The second method hands out the same indices as the first
    let mut code = open(&mut class, "second");
    let own_label = code.fresh_label();
    assert_ne!(own_label, first_label);
    code.emit(Instruction::ILoad(0)).unwrap();
    let own_switch = code.lookup_switch(1).unwrap();
    assert_ne!(own_switch, first_switch);

    match code.emit_branch(BranchInstruction::Goto(first_label)) {
        Err(Error::UnknownLabel { method, label }) => {
            assert_eq!(method, "second(I)I");
            assert_eq!(label, first_label);
        }
        other => panic!("expected an unknown label, got {:?}", other),
    }
    let err = code.mark_label(first_label).unwrap_err();
    assert!(matches!(err, Error::UnknownLabel { .. }));
    assert_eq!(err.kind(), ErrorKind::CallerProtocol);
    assert!(matches!(
        code.switch_case(own_switch, 1, first_label),
        Err(Error::UnknownLabel { .. })
    ));
    assert!(matches!(
        code.mark_switch_case(first_switch, 1),
        Err(Error::UnknownSwitch { .. })
    ));
    assert!(matches!(
        code.mark_switch_default(first_switch),
        Err(Error::UnknownSwitch { .. })
    ));

    // None of the rejected calls got in the way of the method's own labels and switches
    code.switch_case(own_switch, 1, own_label).unwrap();
    code.mark_switch_default(own_switch).unwrap();
    return_int(&mut code, 2);
    code.mark_label(own_label).unwrap();
    return_int(&mut code, 3);
    code.close(0).unwrap();

    let decoded = decoded_body(class, "second");
    let switch = &decoded[1].1;
    assert_eq!(route(&decoded, switch, 1), 3);
    assert_eq!(route(&decoded, switch, 7), 2);
}
