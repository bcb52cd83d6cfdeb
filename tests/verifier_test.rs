//! SSA verifier tests on programmatically damaged functions.

use tpde_ssa::core::LowerError;
use tpde_ssa::lir::{parse_function, BlockId, Function, Inst, Operand, Value, ValueKind};
use tpde_ssa::ssa::{verify, verify_or_panic};

const DIAMOND: &str = "\
func diamond {
entry:
  %p:i32 = param
  %q:i32 = param
  branch %p, ^left, ^right
left:
  %l:i32 = add %p, %q
  jump ^join [%l, %q]
right:
  %r:i32 = sub %p, %q
  jump ^join [%r, %p]
join:
  label [%x:i32, %y:i32]
  %z:i32 = mul %x, %y
  ret %z
}
";

fn diamond() -> Function {
    let func = parse_function(DIAMOND).unwrap();
    verify(&func).unwrap();
    func
}

fn block(func: &Function, name: &str) -> BlockId {
    func.block_by_name(name).unwrap()
}

#[test]
fn test_injected_redefinition() {
    let mut func = diamond();
    let q = func.variable("q").unwrap();
    let p = func.variable("p").unwrap();
    let right = block(&func, "right");
    func.block_mut(right).insts.insert(0, Inst::Move { dst: q, src: p.into() });

    match verify(&func).unwrap_err() {
        LowerError::Redefinition { func, block, index, value, prior_block, prior_site, .. } => {
            assert_eq!(func, "diamond");
            assert_eq!(block, "right");
            assert_eq!(index, 0);
            assert_eq!(value, "%q");
            assert_eq!(prior_block, "entry");
            assert_eq!(prior_site, "instruction 1 `%q:i32 = param`");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_injected_use_before_def() {
    let mut func = diamond();
    let ghost = func.declare_variable("ghost", ValueKind::I32);
    let out = func.declare_variable("out", ValueKind::I32);
    let join = block(&func, "join");
    func.block_mut(join).insts.insert(
        1,
        Inst::op("neg", vec![out.into()], vec![Operand::new(ghost)]),
    );

    let err = verify(&func).unwrap_err();
    assert!(matches!(err, LowerError::UseBeforeDef { index: 1, .. }), "{}", err);
    assert_eq!(
        err.to_string(),
        "diamond: use of undefined value %ghost in block join at instruction 1 `%out:i32 = neg %ghost`"
    );

    // The same read is fine when marked as possibly uninitialized.
    if let Inst::Op(op) = &mut func.block_mut(join).insts[1] {
        op.inputs[0].uninit = true;
    }
    verify(&func).unwrap();
}

#[test]
fn test_use_in_sibling_block() {
    let mut func = diamond();
    let l = func.variable("l").unwrap();
    let right = block(&func, "right");
    if let Some(Inst::Jump { outgoing, .. }) = func.block_mut(right).terminator_mut() {
        outgoing[0] = Value::Variable(l);
    }

    let err = verify(&func).unwrap_err();
    assert!(matches!(
        &err,
        LowerError::NotDominated { block, def_block, .. } if block == "right" && def_block == "left"
    ));
}

#[test]
fn test_phi_value_used_outside_merge_region() {
    let mut func = diamond();
    let x = func.variable("x").unwrap();
    let left = block(&func, "left");
    let out = func.declare_variable("early", ValueKind::I32);
    func.block_mut(left)
        .insts
        .insert(0, Inst::op("copy", vec![out.into()], vec![Operand::new(x)]));

    assert!(matches!(verify(&func).unwrap_err(), LowerError::NotDominated { .. }));
}

#[test]
fn test_unreachable_blocks_are_skipped() {
    let text = "\
func dead {
entry:
  %a:i32 = param
  ret %a
orphan:
  %b:i32 = add %nowhere:i32, %a
  ret %b
}
";
    verify(&parse_function(text).unwrap()).unwrap();
}

#[test]
fn test_fixed_locations_are_exempt() {
    let text = "\
func fixed {
entry:
  r0:i64 = param
  r0:i64 = add r0:i64, #1:i64
  s3:i64 = move2 r0:i64
  ret s3:i64
}
";
    verify(&parse_function(text).unwrap()).unwrap();
}

#[test]
#[should_panic(expected = "SSA verification failed")]
fn test_verify_or_panic() {
    let mut func = diamond();
    let join = block(&func, "join");
    func.block_mut(join).insts.pop();
    verify_or_panic(&func);
}

const LOWERED_CROSSING: &str = "\
func crossing {
entry:
  %v1:i32 = param
  %v2:i32 = param
  %v10:i32 = move %v1
  %v11:i32 = move %v2
  jump ^m
m(%v10:i32, %v11:i32):
  label
  %c:i32 = cmp %v10, %v11
  branch %c, ^p2, ^exit
p2:
  %tmp:i32 = move %v11
  %v11:i32 = move %v10
  %v10:i32 = move %tmp
  jump ^m
exit:
  ret %v10
}
";

#[test]
fn test_lowered_function_verifies() {
    verify(&parse_function(LOWERED_CROSSING).unwrap()).unwrap();
}

#[test]
fn test_missing_edge_move_is_reported() {
    let mut func = parse_function(LOWERED_CROSSING).unwrap();
    let entry = block(&func, "entry");
    func.block_mut(entry).insts.remove(2);

    match verify(&func).unwrap_err() {
        LowerError::UseBeforeDef { block, index, inst, value, .. } => {
            assert_eq!(block, "entry");
            assert_eq!(index, 3);
            assert_eq!(inst, "jump ^m");
            assert_eq!(value, "%v10");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_dropped_self_move_on_back_edge_is_accepted() {
    let text = "\
func invariant {
entry:
  %n:i32 = param
  %k:i32 = move %n
  %i:i32 = move #0:i32
  jump ^loop
loop(%k:i32, %i:i32):
  label
  %i2:i32 = add %i, %k
  branch %i2, ^latch, ^exit
latch:
  %i:i32 = move %i2
  jump ^loop
exit:
  ret %i2
}
";
    verify(&parse_function(text).unwrap()).unwrap();
}

#[test]
fn test_merge_variable_of_entry_block_is_never_assigned() {
    let text = "\
func orphan {
m(%x:i32):
  label
  ret %x
}
";
    let err = verify(&parse_function(text).unwrap()).unwrap_err();
    assert!(
        matches!(&err, LowerError::UseBeforeDef { block, value, .. } if block == "m" && value == "%x"),
        "{}",
        err
    );
}
