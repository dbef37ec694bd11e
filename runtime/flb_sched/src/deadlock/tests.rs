use super::*;
use pretty_assertions::assert_eq;

fn sorted(mut components: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    for component in &mut components {
        component.sort_unstable();
    }
    components.sort();
    components
}

#[test]
fn test_two_cycle_is_one_component() {
    let components = strongly_connected(&[vec![1], vec![0]]);
    assert_eq!(sorted(components), vec![vec![0, 1]]);
}

#[test]
fn test_chain_splits_into_singletons() {
    let components = strongly_connected(&[vec![1], vec![2], vec![]]);
    assert_eq!(components, vec![vec![2], vec![1], vec![0]]);
}

#[test]
fn test_self_loop() {
    let components = strongly_connected(&[vec![0], vec![0]]);
    assert_eq!(sorted(components), vec![vec![0], vec![1]]);
}

#[test]
fn test_cycle_with_tail() {
    // 0 -> 1 -> 2 -> 1, 3 -> 0
    let successors = vec![vec![1], vec![2], vec![1], vec![0]];
    let components = strongly_connected(&successors);
    assert_eq!(components.len(), 3);
    assert_eq!(sorted(components), vec![vec![0], vec![1, 2], vec![3]]);
}

#[test]
fn test_long_chain_does_not_recurse() {
    let size = 200_000;
    let successors: Vec<Vec<usize>> = (0..size)
        .map(|i| if i + 1 < size { vec![i + 1] } else { vec![0] })
        .collect();
    let components = strongly_connected(&successors);
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].len(), size);
}

#[test]
fn test_report_collects_and_replays() {
    let wait = |id, description: &str| PendingWait {
        id,
        kind: crate::WaitKind::Await,
        description: description.to_owned(),
        trace: flb_ir::Trace::EMPTY,
    };
    let mut report = DeadlockReport::default();
    report.accept(&wait(1, "a"));
    report.accept(&wait(2, "b"));
    report.finish();
    report.accept(&wait(3, "c"));
    report.finish();

    struct Count(Vec<usize>, usize);
    impl CycleSink for Count {
        fn accept(&mut self, _: &PendingWait) {
            self.1 += 1;
        }
        fn finish(&mut self) {
            self.0.push(self.1);
            self.1 = 0;
        }
    }
    let mut count = Count(Vec::new(), 0);
    report.replay(&mut count);
    assert_eq!(count.0, vec![2, 1]);
    assert_eq!(report.cycle_containing("b").map(<[_]>::len), Some(2));
}
