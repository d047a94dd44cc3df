use std::sync::Arc;
use std::thread;

use hostbox::{AuditRecord, AuditService, AuditSink, FileAuditSink};

const WRITERS: usize = 16;
const RECORDS_PER_WRITER: usize = 200;

#[test]
fn test_concurrent_appends_never_interleave() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("audit.log");
    let sink: Arc<dyn AuditSink> = Arc::new(FileAuditSink::open(&path).unwrap());
    let service = AuditService::new(sink, true);

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let service = service.clone();
            thread::spawn(move || {
                // Long payloads make torn writes visible if appends are not serialized.
                let payload = format!("{writer:02}-").repeat(500);
                for seq in 0..RECORDS_PER_WRITER {
                    service.log(
                        AuditRecord::new(format!("State = success #{seq}"), format!("worker-{writer}"))
                            .with_request("remotecmd", Some("x=1"))
                            .with_body(Some(payload.clone())),
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), WRITERS * RECORDS_PER_WRITER);

    let mut per_writer = vec![0usize; WRITERS];
    for line in lines {
        let fields: Vec<&str> = line.split(" :: ").collect();
        assert_eq!(fields.len(), 6, "malformed line: {line}");

        let writer: usize = fields[2].trim_start_matches("worker-").parse().unwrap();
        assert_eq!(fields[4], "x=1");
        assert_eq!(fields[5], format!("{writer:02}-").repeat(500));

        // Each writer's records stay in the order it produced them.
        let seq: usize = fields[1].trim_start_matches("State = success #").parse().unwrap();
        assert_eq!(seq, per_writer[writer]);
        per_writer[writer] += 1;
    }

    assert!(per_writer.iter().all(|&count| count == RECORDS_PER_WRITER));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_one_sink() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("audit.log");
    let service = AuditService::new(Arc::new(FileAuditSink::open(&path).unwrap()), false);

    let tasks: Vec<_> = (0..32)
        .map(|task| {
            let service = service.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    service.log(AuditRecord::new("State = success", format!("task-{task}")).with_request("check", None));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 32 * 25);
    assert!(content
        .lines()
        .all(|line| line.ends_with(":: check ::  :: null")));
}
