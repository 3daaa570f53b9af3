use std::collections::BTreeSet;
use streamgroup_macros::stream_id;
use uuid::Uuid;

#[stream_id]
struct WorkerName(String);

#[stream_id]
struct SessionId(Uuid);

#[stream_id(debug = false)]
struct SecretId(String);

impl std::fmt::Debug for SecretId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretId(..)")
    }
}

fn main() {
    let w = WorkerName::new("w-1");
    assert_eq!(w.as_str(), "w-1");
    assert_eq!(w.to_string(), "w-1");
    assert_eq!(WorkerName::from("w-1"), w);
    let parsed: WorkerName = "w-1".parse().unwrap();
    assert_eq!(parsed, w);
    let raw: String = w.clone().into();
    assert_eq!(raw, "w-1");

    // Ord 可用于有序集合
    let set: BTreeSet<WorkerName> = [WorkerName::new("b"), WorkerName::new("a")].into();
    assert_eq!(set.iter().next().map(|n| n.as_str()), Some("a"));

    let sid = SessionId::new(Uuid::new_v4());
    let _ = format!("{:?} {}", sid, sid);

    // 使用手写 Debug，可编译则说明未自动派生 Debug
    let _ = format!("{:?}", SecretId::new("s"));
}
