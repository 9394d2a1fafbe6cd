// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use archasm::arch::{self, EncodingError, VarIdx};
use archasm::instr::{Condition, Input, Instruction, Operation};
use archasm::linker::MemoryProvider;
use archasm::program::Program;
use archasm::word::WordType;
use archasm::Assembler;
use proptest::prelude::*;
use rstest::rstest;

fn address(value: u8) -> VarIdx {
    arch::by_id("rx8").unwrap().registers().by_address(value).unwrap()
}

fn input(immediate_only: bool) -> BoxedStrategy<Input> {
    let immediate = any::<u8>().prop_map(|value| Input::Immediate(value as u64));
    if immediate_only {
        return immediate.boxed();
    }
    prop_oneof![immediate, (0u8..14).prop_map(|no| Input::Register(address(no)))].boxed()
}

prop_compose! {
    fn instruction()(
        operation in prop::sample::select(Operation::ALL.to_vec()),
        condition in prop::sample::select(Condition::all().to_vec()),
        source in prop::option::of(0u8..11),
        output in prop::option::of(0u8..14),
    )(
        a in input(matches!(operation, Operation::Load2 | Operation::Call2)),
        b in input(matches!(operation, Operation::Load2 | Operation::Call2)),
        operation in Just(operation),
        condition in Just(condition),
        source in Just(source),
        output in Just(output),
    ) -> Instruction {
        let mut instr = Instruction::new(operation)
            .with_inputs(a, b)
            .when(condition, source.map(address));
        instr.output = output.map(address);
        instr
    }
}

proptest! {
    #[test]
    fn rx8_round_trip(instructions in prop::collection::vec(instruction(), 1..16)) {
        let arch = arch::by_id("rx8").unwrap();
        let program = Program::new(instructions);
        let image = program.encode(&arch).unwrap();
        prop_assert_eq!(image.len(), program.len() * 5);
        prop_assert_eq!(Program::decode(&arch, &image).unwrap(), program);
    }
}

#[test]
fn assembled_program_round_trip() {
    let arch = arch::by_id("rx8").unwrap();
    let program = Assembler::with_provider(arch.clone(), MemoryProvider::new())
        .assemble_str(
            "test",
            "@start: R1 = 3\n{\nR2 = R2 + R1 if R1 > 0\nR1 = dec R1\nrepeat if R1 != 0\n}\n\
             X = 0x1234\nbreak\n!data 77",
        )
        .unwrap();
    let image = program.encode(&arch).unwrap();
    assert_eq!(&image[..5], &[0x01 << 2, 0x1F, 1, 3, 0]);
    assert_eq!(Program::decode(&arch, &image).unwrap(), program);
}

#[test]
fn bit_layout() {
    let arch = arch::by_id("rx8").unwrap();
    let add = Instruction::new(Operation::Add)
        .with_output(address(3))
        .with_inputs(Input::Register(address(2)), Input::Immediate(7))
        .when(Condition::Greater, Some(address(1)));
    assert_eq!(
        arch.encode_instruction(&add).unwrap(),
        vec![0x03 << 2 | 0b10, 0b110 << 5 | 1, 3, 2, 7]
    );

    let jump = Instruction::new(Operation::Load)
        .with_output(address(11))
        .with_inputs(Input::Register(address(8)), Input::default());
    assert_eq!(arch.encode_instruction(&jump).unwrap(), vec![0x01 << 2 | 0b10, 0x1F, 11, 8, 0]);
}

#[rstest]
#[case(&[0x01 << 2, 0, 1, 3], EncodingError::WrongLength { expected: 5, found: 4 })]
#[case(&[0x3F << 2, 0, 1, 3, 0], EncodingError::UnknownOpcode(0x3F))]
#[case(&[0x01 << 2, 0, 0x21, 3, 0], EncodingError::ReservedBits)]
#[case(&[0x01 << 2, 0, 0x1E, 3, 0], EncodingError::UnknownAddress(0x1E))]
#[case(&[0x01 << 2 | 0b10, 0, 1, 20, 0], EncodingError::UnknownAddress(20))]
fn malformed_images(#[case] bytes: &[u8], #[case] expected: EncodingError) {
    let arch = arch::by_id("rx8").unwrap();
    assert_eq!(arch.decode_instruction(bytes), Err(expected));
}

#[test]
fn unencodable_instructions() {
    let arch = arch::by_id("rx8").unwrap();
    let r1 = address(1);

    let wide = Instruction::new(Operation::Add)
        .with_output(r1)
        .with_inputs(Input::Register(r1), Input::Immediate(300));
    assert_eq!(
        arch.encode_instruction(&wide),
        Err(EncodingError::ImmediateTooWide { value: 300, ty: WordType::U8 })
    );

    let shape = Instruction::new(Operation::Load2)
        .with_output(address(11))
        .with_inputs(Input::Register(r1), Input::Immediate(0));
    assert!(matches!(
        arch.encode_instruction(&shape),
        Err(EncodingError::OperandShape { operation: Operation::Load2, .. })
    ));

    let condition = Instruction::new(Operation::Nop).when(Condition::Equal, Some(address(12)));
    assert_eq!(
        arch.encode_instruction(&condition),
        Err(EncodingError::NotConditionable("PCL".to_owned()))
    );

    let rx16 = arch::by_id("rx16").unwrap();
    let issues = Program::new(vec![Instruction::halt()]).encode(&rx16).unwrap_err();
    assert_eq!(issues.errors().next(), Some(&EncodingError::Unsupported("RX16")));
}

#[test]
fn encoding_errors_are_reported_per_instruction() {
    let arch = arch::by_id("rx8").unwrap();
    let wide = Instruction::new(Operation::StackPush)
        .with_inputs(Input::Immediate(256), Input::default());
    let program = Program::new(vec![wide, Instruction::halt(), wide]);
    let issues = program.encode(&arch).unwrap_err();
    assert_eq!(issues.count_errors(), 2);
}
