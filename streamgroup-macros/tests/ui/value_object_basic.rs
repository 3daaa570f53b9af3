use streamgroup_macros::value_object;

#[value_object]
struct Threshold {
    millis: u64,
}

#[value_object(debug = false)]
struct Opaque(i32);

#[value_object]
enum Position {
    #[default]
    Beginning,
    Tail,
    After(u64),
}

fn main() {
    // Debug 默认开启，应可格式化
    let _ = format!("{:?}", Threshold { millis: 0 });

    let a = Threshold::default();
    let _b = a.clone();
    let _eq = a == Threshold { millis: 0 };

    // debug = false 时只做构造
    let _ = Opaque(1);

    let p: Position = Default::default();
    assert!(p == Position::Beginning);
    let _ = Position::After(3) != Position::Tail;
}
