//! Everything the assembler emits decodes back into the instruction that was requested

mod common;

use classfile_assembler::jvm::code::{
    BranchInstruction, CompareMode, Instruction, InvokeType, OrdComparison,
};
use classfile_assembler::jvm::{
    AssemblerSettings, BaseType, BinaryName, ClassAccessFlags, ClassAssembler, FieldAccessFlags,
    FieldRef, FieldType, MethodAccessFlags, MethodDescriptor, MethodRef, Name, RefType,
    UnqualifiedName,
};
use common::ParsedClass;

fn binary(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_owned()).unwrap()
}

fn unqualified(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_owned()).unwrap()
}

fn object(name: &str) -> FieldType {
    FieldType::object(binary(name))
}

fn method(parameters: Vec<FieldType>, return_type: Option<FieldType>) -> MethodDescriptor {
    MethodDescriptor {
        parameters,
        return_type,
    }
}

#[test]
fn every_category_round_trips() {
    common::init_logging();

    let mut class = ClassAssembler::new(
        binary("demo/RoundTrip"),
        Some(BinaryName::OBJECT),
        vec![],
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        AssemblerSettings::default(),
    )
    .unwrap();
    class
        .declare_field(
            FieldAccessFlags::STATIC,
            unqualified("boxed"),
            object("java/lang/Integer"),
        )
        .unwrap();

    // static void run(int, long, float, double, String[])
    let descriptor = method(
        vec![
            FieldType::int(),
            FieldType::long(),
            FieldType::float(),
            FieldType::double(),
            FieldType::array(object("java/lang/String")),
        ],
        None,
    );
    let mut code = class
        .open_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            unqualified("run"),
            descriptor,
        )
        .unwrap();

    let body = code.fresh_label();
    let failure = binary("java/lang/IllegalStateException");
    code.emit(Instruction::ILoad(0)).unwrap();
    code.emit_branch(BranchInstruction::If(OrdComparison::EQ, body))
        .unwrap();
    code.emit(Instruction::New(RefType::Object(failure.clone())))
        .unwrap();
    code.emit(Instruction::Dup).unwrap();
    code.emit(Instruction::Invoke(
        InvokeType::Special,
        MethodRef::new(failure, UnqualifiedName::INIT, method(vec![], None)),
    ))
    .unwrap();
    code.emit_branch(BranchInstruction::AThrow).unwrap();

    code.mark_label(body).unwrap();
    code.emit(Instruction::ILoad(0)).unwrap();
    code.emit(Instruction::I2L).unwrap();
    code.emit(Instruction::LLoad(1)).unwrap();
    code.emit(Instruction::LAdd).unwrap();
    code.emit(Instruction::LStore(7)).unwrap();
    code.emit(Instruction::FLoad(3)).unwrap();
    code.emit(Instruction::F2D).unwrap();
    code.emit(Instruction::DLoad(4)).unwrap();
    code.emit(Instruction::DMul).unwrap();
    code.emit(Instruction::DStore(9)).unwrap();
    code.emit(Instruction::ALoad(6)).unwrap();
    code.emit(Instruction::ArrayLength).unwrap();
    code.emit(Instruction::IStore(300)).unwrap();
    code.emit(Instruction::IInc(300, 1000)).unwrap();
    code.emit(Instruction::LLoad(7)).unwrap();
    code.push_long(1).unwrap();
    code.emit(Instruction::LCmp).unwrap();
    code.emit(Instruction::Pop).unwrap();
    code.emit(Instruction::FLoad(3)).unwrap();
    code.push_float(2.0).unwrap();
    code.emit(Instruction::FCmp(CompareMode::L)).unwrap();
    code.emit(Instruction::Pop).unwrap();

    code.push_int(3).unwrap();
    code.emit(Instruction::NewArray(BaseType::Int)).unwrap();
    code.emit(Instruction::AStore(11)).unwrap();
    code.emit(Instruction::ALoad(11)).unwrap();
    code.push_int(0).unwrap();
    code.push_int(42).unwrap();
    code.emit(Instruction::IAStore).unwrap();

    code.emit(Instruction::GetStatic(FieldRef::new(
        binary("java/lang/System"),
        unqualified("out"),
        object("java/io/PrintStream"),
    )))
    .unwrap();
    code.emit(Instruction::ILoad(300)).unwrap();
    code.emit(Instruction::Invoke(
        InvokeType::Virtual,
        MethodRef::new(
            binary("java/io/PrintStream"),
            unqualified("println"),
            method(vec![FieldType::int()], None),
        ),
    ))
    .unwrap();

    code.emit(Instruction::AConstNull).unwrap();
    code.emit(Instruction::CheckCast(RefType::Object(binary("java/util/List"))))
        .unwrap();
    code.emit(Instruction::Invoke(
        InvokeType::Interface,
        MethodRef::interface(
            binary("java/util/List"),
            unqualified("size"),
            method(vec![], Some(FieldType::int())),
        ),
    ))
    .unwrap();
    code.emit(Instruction::Invoke(
        InvokeType::Static,
        MethodRef::new(
            BinaryName::INTEGER,
            unqualified("valueOf"),
            method(vec![FieldType::int()], Some(object("java/lang/Integer"))),
        ),
    ))
    .unwrap();
    code.emit(Instruction::PutStatic(FieldRef::new(
        binary("demo/RoundTrip"),
        unqualified("boxed"),
        object("java/lang/Integer"),
    )))
    .unwrap();

    let int_2d = RefType::array(FieldType::array(FieldType::int()));
    code.push_int(2).unwrap();
    code.push_int(3).unwrap();
    code.emit(Instruction::MultiANewArray(int_2d, 2)).unwrap();
    code.emit(Instruction::Pop).unwrap();
    code.push_int(1).unwrap();
    code.emit(Instruction::ANewArray(RefType::Object(BinaryName::STRING)))
        .unwrap();
    code.emit(Instruction::Pop).unwrap();

    code.emit(Instruction::ALoad(6)).unwrap();
    code.emit(Instruction::MonitorEnter).unwrap();
    code.emit(Instruction::ALoad(6)).unwrap();
    code.emit(Instruction::MonitorExit).unwrap();

    code.push_double(2.5).unwrap();
    code.emit(Instruction::D2I).unwrap();
    code.emit(Instruction::INeg).unwrap();
    code.push_int(100_000).unwrap();
    code.emit(Instruction::ISub).unwrap();
    code.emit(Instruction::Pop).unwrap();
    code.push_string("done").unwrap();
    code.emit(Instruction::InstanceOf(RefType::Object(BinaryName::STRING)))
        .unwrap();
    code.emit(Instruction::Pop).unwrap();
    code.emit_branch(BranchInstruction::Return).unwrap();
    code.close(0).unwrap();

    let parsed = ParsedClass::parse(&class.to_bytes().unwrap()).unwrap();
    let run = parsed.code("run");
    assert_eq!(
        parsed.render_code(&run.code),
        vec![
            "15 local 0",
            "99 -> #6",
            "bb java/lang/IllegalStateException",
            "59",
            "b7 java/lang/IllegalStateException.<init>:()V",
            "bf",
            "15 local 0",
            "85",
            "16 local 1",
            "61",
            "37 local 7",
            "17 local 3",
            "8d",
            "18 local 4",
            "6b",
            "39 local 9",
            "19 local 6",
            "be",
            "36 local 300",
            "84 local 300 by 1000",
            "16 local 7",
            "0a",
            "94",
            "57",
            "17 local 3",
            "0d",
            "95",
            "57",
            "06",
            "bc 10",
            "3a local 11",
            "19 local 11",
            "03",
            "10 42",
            "4f",
            "b2 java/lang/System.out:Ljava/io/PrintStream;",
            "15 local 300",
            "b6 java/io/PrintStream.println:(I)V",
            "01",
            "c0 java/util/List",
            "b9 java/util/List.size:()I (interface) count 1",
            "b8 java/lang/Integer.valueOf:(I)Ljava/lang/Integer;",
            "b3 demo/RoundTrip.boxed:Ljava/lang/Integer;",
            "05",
            "06",
            "c5 [[I dims 2",
            "57",
            "04",
            "bd java/lang/String",
            "57",
            "19 local 6",
            "c2",
            "19 local 6",
            "c3",
            "14 double 2.5",
            "8e",
            "74",
            "12 int 100000",
            "64",
            "57",
            "12 string \"done\"",
            "c1 java/lang/String",
            "57",
            "b1",
        ]
    );
    assert_eq!(run.max_stack, 4);
    assert_eq!(run.max_locals, 301);
    assert!(run.exception_table.is_empty());
}

#[test]
fn short_forms_are_used_where_they_exist() {
    let mut class = ClassAssembler::new(
        binary("demo/Short"),
        Some(BinaryName::OBJECT),
        vec![],
        ClassAccessFlags::SUPER,
        AssemblerSettings::default(),
    )
    .unwrap();
    let mut code = class
        .open_method(
            MethodAccessFlags::STATIC,
            unqualified("f"),
            method(vec![FieldType::int(), FieldType::long()], None),
        )
        .unwrap();
    code.emit(Instruction::ILoad(0)).unwrap();
    code.emit(Instruction::LLoad(1)).unwrap();
    code.emit(Instruction::Pop2).unwrap();
    code.emit(Instruction::IStore(3)).unwrap();
    code.emit(Instruction::ILoad(4)).unwrap();
    code.emit(Instruction::Pop).unwrap();
    code.emit_branch(BranchInstruction::Return).unwrap();
    code.close(0).unwrap();

    let parsed = ParsedClass::parse(&class.to_bytes().unwrap()).unwrap();
    let f = parsed.code("f");

    // iload_0, lload_1, pop2, istore_3, iload 4, pop, return
    assert_eq!(f.code, vec![0x1a, 0x1f, 0x58, 0x3e, 0x15, 4, 0x57, 0xb1]);
    assert_eq!(f.max_locals, 5);
}
