//! Runtime calls made from simulated code through entry point thunks.

use code_sim::a64::{PairIndex, Shift, Width};
use code_sim::abi::{IP0, SP_CODE};
use code_sim::test_harness::*;
use code_sim::{Error, Instruction, JValue, Shorty};

fn entry_address(f: usize) -> u64 {
    f as u64
}

fn movz(rd: u8, imm16: u16) -> Instruction {
    Instruction::Movz {
        width: Width::X,
        rd,
        imm16,
        hw: 0,
    }
}

fn add_imm(rd: u8, rn: u8, imm12: u16) -> Instruction {
    Instruction::AddImm {
        width: Width::X,
        rd,
        rn,
        imm12,
        shift12: false,
    }
}

fn run_static(program: &[Instruction], shorty: &str, args: &[u32]) -> code_sim::Result<JValue> {
    let mut sim = simulator_with_code(program);
    let method = TestMethod::new("Foo.alloc", CODE_BASE);
    let shorty = Shorty::new(shorty).expect("valid shorty");
    let mut result = JValue::Void;
    sim.invoke(&method, args, &TestContext::new(1), &mut result, &shorty, true)?;
    Ok(result)
}

/// `blr` to `entry` with x0 = class handle and w1 from the first argument,
/// then add one to the returned pointer to prove execution resumed.
fn alloc_program(entry: u64) -> Vec<Instruction> {
    let mut program = vec![movz(0, 0x100)];
    program.extend(load_imm64(IP0, entry));
    program.extend([
        Instruction::Blr { rn: IP0 },
        add_imm(0, 0, 1),
        Instruction::ret(),
    ]);
    program
}

#[test]
fn test_alloc_object_serviced_natively() {
    let entry = entry_address(stub_entry_points().alloc_object_initialized as usize);
    let result = run_static(&alloc_program(entry), "J", &[]).unwrap();
    assert_eq!(result, JValue::Long(fake_object(0x100) as i64 + 1));
}

#[test]
fn test_alloc_array_variants_pass_count_in_w1() {
    let entry_points = stub_entry_points();
    let variants = [
        (entry_points.alloc_array_resolved8 as usize, 1),
        (entry_points.alloc_array_resolved16 as usize, 2),
        (entry_points.alloc_array_resolved32 as usize, 4),
        (entry_points.alloc_array_resolved64 as usize, 8),
    ];
    for (f, element_size) in variants {
        let result = run_static(&alloc_program(entry_address(f)), "JI", &[12]).unwrap();
        assert_eq!(
            result,
            JValue::Long(fake_array(0x100, 12, element_size) as i64 + 1),
            "element size {element_size}"
        );
    }
}

#[test]
fn test_suspend_check_resumes_at_link_register() {
    let entry = entry_address(stub_entry_points().test_suspend as usize);
    // main: stp fp, lr; bl thunk; movz x0, #7; ldp fp, lr; ret
    // thunk: load entry into ip0; br ip0
    let mut program = vec![
        Instruction::Stp {
            rt: 29,
            rt2: 30,
            rn: SP_CODE,
            offset: -16,
            index: PairIndex::PreIndex,
        },
        Instruction::Bl { offset: 16 },
        movz(0, 7),
        Instruction::Ldp {
            rt: 29,
            rt2: 30,
            rn: SP_CODE,
            offset: 16,
            index: PairIndex::PostIndex,
        },
        Instruction::ret(),
    ];
    program.extend(load_imm64(IP0, entry));
    program.push(Instruction::Br { rn: IP0 });

    let checks = suspend_checks();
    let result = run_static(&program, "I", &[]).unwrap();
    assert_eq!(result, JValue::Long(7));
    assert_eq!(suspend_checks(), checks + 1);
}

#[test]
fn test_branch_form_must_match_entry_kind() {
    // The suspend check is only recognized through `br`; through `blr` it is
    // an ordinary simulated branch into unmapped memory.
    let entry = entry_address(stub_entry_points().test_suspend as usize);
    let checks = suspend_checks();
    let err = run_static(&alloc_program(entry), "J", &[]).unwrap_err();
    assert!(matches!(err, Error::MemoryFault { address, .. } if address == entry));
    assert_eq!(suspend_checks(), checks);
}

#[test]
fn test_unknown_target_is_simulated() {
    // blr to a helper inside the method's own code.
    let helper = CODE_BASE + 4 * 7;
    let mut program = vec![Instruction::mov(19, 30)];
    program.extend(load_imm64(IP0, helper));
    program.extend([
        Instruction::Blr { rn: IP0 },
        Instruction::Ret { rn: 19 },
        // helper: x0 = x1 << 1
        Instruction::AddReg {
            width: Width::X,
            rd: 0,
            rn: SP_CODE,
            rm: 1,
            shift: Shift::Lsl,
            amount: 1,
        },
        Instruction::ret(),
    ]);
    assert_eq!(program.len(), 9);
    let result = run_static(&program, "II", &[21]).unwrap();
    assert_eq!(result, JValue::Long(42));
}
