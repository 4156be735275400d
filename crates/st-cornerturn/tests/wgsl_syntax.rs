use naga::front::wgsl::parse_str;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use st_cornerturn::{Dialect, KernelPlan};

fn identity_plan(name: &str, ty: &str, lanes: usize) -> KernelPlan {
    let plan = KernelPlan::new(name, ty, ty, lanes).unwrap();
    plan.identity_transforms(Dialect::Wgsl)
        .into_iter()
        .fold(plan, |p, line| p.with_transform(line))
}

fn check(plan: &KernelPlan) {
    let source = plan.emit(Dialect::Wgsl).unwrap();
    let module = parse_str(&source)
        .unwrap_or_else(|err| panic!("wgsl parse failed for {}: {err}\n{source}", plan.name()));
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .unwrap_or_else(|err| panic!("wgsl validation failed for {}: {err:?}\n{source}", plan.name()));
}

#[test]
fn generated_kernels_are_valid_wgsl() {
    for (name, ty, lanes) in [
        ("turn_f32_l1", "float", 1usize),
        ("turn_f32_l2", "float", 2),
        ("turn_f32_l4", "float", 4),
        ("turn_f32_l32", "float", 32),
        ("turn_v2_l8", "float2", 8),
        ("turn_v4_l4", "float4", 4),
        ("turn_i32_l4", "int", 4),
        ("turn_u32_l16", "uint", 16),
    ] {
        check(&identity_plan(name, ty, lanes));
    }
}

#[test]
fn custom_transform_lines_survive_validation() {
    let plan = KernelPlan::new("turn_scaled", "float", "float", 4)
        .unwrap()
        .with_transform("vout[0] = vin[0] * 2.0;")
        .with_transform("vout[1] = vin[1] * 2.0;")
        .with_transform("vout[2] = vin[2] * 2.0;")
        .with_transform("vout[3] = vin[3] * 2.0;");
    check(&plan);
}

#[test]
fn widening_transforms_survive_validation() {
    let plan = KernelPlan::new("turn_widen", "float", "float2", 4).unwrap();
    let plan = (0..4).fold(plan, |p, k| {
        p.with_transform(format!("vout[{k}] = vec2<f32>(vin[{k}], -vin[{k}]);"))
    });
    check(&plan);
}
