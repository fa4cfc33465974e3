//! End-to-end convergence scenarios against the in-memory store
//!
//! The source resolver is scripted per repository URL so every scenario is
//! deterministic and offline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hedron_controller::context::{Clock, Context};
use hedron_controller::error::ErrorClass;
use hedron_controller::reconciler::{Action, reconcile_job, reconcile_project, reconcile_revision};
use hedron_controller::runtime::{Controller, ControllerSettings};
use hedron_controller::source::{ResolveError, SourceResolver};
use hedron_controller::store::{Api, MemoryStore, ObjectStore};
use hedron_core::domain::job::{Job, JobStatus};
use hedron_core::domain::meta::{LABEL_PROJECT, ObjectKey, Resource};
use hedron_core::domain::naming::ContentHash;
use hedron_core::domain::project::{Project, ProjectSpec};
use hedron_core::domain::revision::{Revision, RevisionState};

#[derive(Clone, Copy)]
enum Answer {
    Hash(&'static str),
    RefNotFound,
    Unreachable,
}

#[derive(Default)]
struct FakeResolver {
    answers: Mutex<HashMap<String, Answer>>,
    calls: AtomicUsize,
}

impl FakeResolver {
    fn answer(&self, url: &str, answer: Answer) {
        self.answers.lock().unwrap().insert(url.to_string(), answer);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceResolver for FakeResolver {
    async fn resolve(&self, url: &str, reference: &str) -> Result<ContentHash, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answers.lock().unwrap().get(url).copied();

        match answer {
            Some(Answer::Hash(hash)) => Ok(ContentHash::parse(hash).unwrap()),
            Some(Answer::Unreachable) => Err(ResolveError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            Some(Answer::RefNotFound) | None => Err(ResolveError::RefNotFound {
                url: url.to_string(),
                reference: reference.to_string(),
            }),
        }
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Harness {
    store: Arc<dyn ObjectStore>,
    resolver: Arc<FakeResolver>,
    ctx: Context,
    now: DateTime<Utc>,
}

impl Harness {
    fn new() -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let resolver = Arc::new(FakeResolver::default());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let ctx = Context::new(Arc::clone(&store), resolver.clone(), Duration::from_secs(60))
            .with_clock(Arc::new(FixedClock(now)));

        Self {
            store,
            resolver,
            ctx,
            now,
        }
    }

    fn projects(&self) -> Api<Project> {
        Api::new(Arc::clone(&self.store))
    }

    fn revisions(&self) -> Api<Revision> {
        Api::new(Arc::clone(&self.store))
    }

    fn jobs(&self) -> Api<Job> {
        Api::new(Arc::clone(&self.store))
    }

    async fn create_project(&self, name: &str, image: &str) -> Project {
        let mut spec = ProjectSpec::default();
        spec.image.name = image.to_string();
        spec.image.cmd = vec!["make".to_string(), "test".to_string()];
        spec.repository.url = url(name);
        spec.repository.reference = "main".to_string();

        self.projects()
            .create(&Project::new("default", name, spec))
            .await
            .unwrap()
    }

    async fn report(&self, job: &str, status: JobStatus) {
        let jobs = self.jobs();
        let mut current = jobs.get(&key(job)).await.unwrap();
        current.status = status;
        jobs.replace_status(&current).await.unwrap();
    }
}

fn url(project: &str) -> String {
    format!("https://git.example.com/{}.git", project)
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

fn counters(active: u32, succeeded: u32, failed: u32) -> JobStatus {
    JobStatus {
        active,
        succeeded,
        failed,
        ..Default::default()
    }
}

#[tokio::test]
async fn demo_project_converges_to_ready_and_stays_ready() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    let project = h.create_project("demo", "alpine:3").await;

    // Project pass: exactly one Pending revision, named from the hash
    let action = reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(60)));

    let revisions = h.revisions().list(None).await.unwrap();
    assert_eq!(revisions.len(), 1);
    let revision = &revisions[0];
    assert_eq!(revision.metadata.name, "demo-abc123");
    assert_eq!(revision.status.state, RevisionState::Pending);
    assert_eq!(revision.spec.content_hash.as_str(), "abc123");
    assert!(revision.metadata.is_controlled_by(project.metadata.uid.unwrap()));
    assert_eq!(
        revision.metadata.labels.get(LABEL_PROJECT).map(String::as_str),
        Some("demo")
    );

    let stored = h.projects().get(&key("demo")).await.unwrap();
    assert_eq!(stored.status.last_revision.as_deref(), Some("demo-abc123"));
    assert_eq!(stored.status.last_content_hash.as_deref(), Some("abc123"));
    assert_eq!(stored.status.observed_generation, 1);

    // Same hash again: a pure read
    let version = revision.metadata.resource_version;
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    let revisions = h.revisions().list(None).await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].metadata.resource_version, version);
    assert_eq!(h.resolver.calls(), 2);

    // Revision pass: exactly one Job, named after the revision
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();

    let jobs = h.jobs().list(None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.metadata.name, "demo-abc123");
    assert_eq!(job.spec.template.container.image, "alpine:3");
    assert_eq!(job.spec.template.container.args, vec!["make", "test"]);

    let revision = h.revisions().get(&key("demo-abc123")).await.unwrap();
    assert!(job.metadata.is_controlled_by(revision.metadata.uid.unwrap()));
    assert_eq!(revision.status.job_name.as_deref(), Some("demo-abc123"));
    assert_eq!(revision.status.state, RevisionState::Pending);

    // The backend starts the job
    h.report("demo-abc123", counters(1, 0, 0)).await;
    reconcile_job(&h.ctx, &key("demo-abc123")).await.unwrap();
    let revision = h.revisions().get(&key("demo-abc123")).await.unwrap();
    assert_eq!(revision.status.state, RevisionState::Building);

    // ... and it succeeds
    h.report("demo-abc123", counters(0, 1, 0)).await;
    reconcile_job(&h.ctx, &key("demo-abc123")).await.unwrap();
    let revision = h.revisions().get(&key("demo-abc123")).await.unwrap();
    assert_eq!(revision.status.state, RevisionState::Ready);
    assert_eq!(revision.status.last_transition_time, Some(h.now));

    // A later failure report does not flap a terminal revision
    h.report("demo-abc123", counters(0, 1, 1)).await;
    reconcile_job(&h.ctx, &key("demo-abc123")).await.unwrap();
    let after = h.revisions().get(&key("demo-abc123")).await.unwrap();
    assert_eq!(after.status.state, RevisionState::Ready);
    assert_eq!(after.metadata.resource_version, revision.metadata.resource_version);
}

#[tokio::test]
async fn failed_job_fails_the_revision() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    h.create_project("demo", "alpine:3").await;

    reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();

    h.report("demo-abc123", counters(0, 0, 1)).await;
    reconcile_job(&h.ctx, &key("demo-abc123")).await.unwrap();

    let revision = h.revisions().get(&key("demo-abc123")).await.unwrap();
    assert_eq!(revision.status.state, RevisionState::Failed);
    assert_eq!(
        revision.status.message.as_deref(),
        Some("job demo-abc123 failed")
    );
}

#[tokio::test]
async fn unresolvable_reference_creates_nothing() {
    let h = Harness::new();
    h.resolver.answer(&url("ghost"), Answer::RefNotFound);
    h.create_project("ghost", "alpine:3").await;

    let err = reconcile_project(&h.ctx, &key("ghost")).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permanent);

    assert!(h.revisions().list(None).await.unwrap().is_empty());
    assert!(h.jobs().list(None).await.unwrap().is_empty());

    let project = h.projects().get(&key("ghost")).await.unwrap();
    let message = project.status.message.unwrap_or_default();
    assert!(message.contains("main"), "unexpected message: {}", message);
    assert!(project.status.last_revision.is_none());
}

#[tokio::test]
async fn resolver_failure_is_isolated_to_its_project() {
    let h = Harness::new();
    h.resolver.answer(&url("flaky"), Answer::Unreachable);
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    h.create_project("flaky", "alpine:3").await;
    h.create_project("demo", "alpine:3").await;

    let err = reconcile_project(&h.ctx, &key("flaky")).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();

    let revisions = h.revisions().list(None).await.unwrap();
    let names: Vec<_> = revisions.iter().map(|r| r.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["demo-abc123"]);

    // Once the repository is reachable again the project catches up and the
    // failure reason is cleared
    h.resolver.answer(&url("flaky"), Answer::Hash("fff000"));
    reconcile_project(&h.ctx, &key("flaky")).await.unwrap();
    let flaky = h.projects().get(&key("flaky")).await.unwrap();
    assert_eq!(flaky.status.last_revision.as_deref(), Some("flaky-fff000"));
    assert!(flaky.status.message.is_none());
}

#[tokio::test]
async fn new_commit_gets_a_new_revision() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    h.create_project("demo", "alpine:3").await;
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();

    h.resolver.answer(&url("demo"), Answer::Hash("def456"));
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();

    let revisions = h.revisions().list(Some("default")).await.unwrap();
    let names: Vec<_> = revisions.iter().map(|r| r.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["demo-abc123", "demo-def456"]);

    let project = h.projects().get(&key("demo")).await.unwrap();
    assert_eq!(project.status.last_revision.as_deref(), Some("demo-def456"));
}

#[tokio::test]
async fn invalid_image_is_permanent_and_visible() {
    let h = Harness::new();
    h.resolver.answer(&url("broken"), Answer::Hash("abc123"));
    h.create_project("broken", "").await;

    reconcile_project(&h.ctx, &key("broken")).await.unwrap();

    let err = reconcile_revision(&h.ctx, &key("broken-abc123")).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert!(h.jobs().list(None).await.unwrap().is_empty());

    let revision = h.revisions().get(&key("broken-abc123")).await.unwrap();
    assert_eq!(revision.status.state, RevisionState::Pending);
    let message = revision.status.message.unwrap_or_default();
    assert!(message.contains("spec.image.name"), "unexpected message: {}", message);
}

#[tokio::test]
async fn deleting_a_project_collects_its_children() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    h.create_project("demo", "alpine:3").await;
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();

    h.projects().delete(&key("demo")).await.unwrap();

    assert!(h.revisions().list(None).await.unwrap().is_empty());
    assert!(h.jobs().list(None).await.unwrap().is_empty());

    // Stray notifications for the deleted objects are harmless
    assert_eq!(reconcile_project(&h.ctx, &key("demo")).await.unwrap(), Action::done());
    assert_eq!(
        reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap(),
        Action::done()
    );
    assert_eq!(reconcile_job(&h.ctx, &key("demo-abc123")).await.unwrap(), Action::done());
}

#[tokio::test]
async fn deleted_job_is_recreated_for_unfinished_revision() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    h.create_project("demo", "alpine:3").await;
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();

    let original = h.jobs().get(&key("demo-abc123")).await.unwrap();
    h.jobs().delete(&original.key()).await.unwrap();

    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();
    let recreated = h.jobs().get(&key("demo-abc123")).await.unwrap();
    assert_ne!(recreated.metadata.uid, original.metadata.uid);
}

#[tokio::test]
async fn project_edits_do_not_reach_existing_revisions() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));
    h.create_project("demo", "alpine:3").await;
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();

    h.report("demo-abc123", counters(1, 0, 0)).await;
    reconcile_job(&h.ctx, &key("demo-abc123")).await.unwrap();
    let revision = h.revisions().get(&key("demo-abc123")).await.unwrap();
    assert_eq!(revision.status.state, RevisionState::Building);

    // The user switches images while the build is running
    let projects = h.projects();
    let mut project = projects.get(&key("demo")).await.unwrap();
    project.spec.image.name = "busybox:latest".to_string();
    project.spec.image.cmd = vec!["true".to_string()];
    projects.replace(&project).await.unwrap();

    // Losing the Job brings back the same build, not the edited one
    h.jobs().delete(&key("demo-abc123")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-abc123")).await.unwrap();

    let recreated = h.jobs().get(&key("demo-abc123")).await.unwrap();
    assert_eq!(recreated.spec.template.container.image, "alpine:3");
    assert_eq!(recreated.spec.template.container.args, vec!["make", "test"]);

    // The next commit is built with the edited image
    h.resolver.answer(&url("demo"), Answer::Hash("def456"));
    reconcile_project(&h.ctx, &key("demo")).await.unwrap();
    reconcile_revision(&h.ctx, &key("demo-def456")).await.unwrap();

    let next = h.jobs().get(&key("demo-def456")).await.unwrap();
    assert_eq!(next.spec.template.container.image, "busybox:latest");
    assert_eq!(next.spec.template.container.args, vec!["true"]);
}

#[tokio::test]
async fn controller_drives_the_cascade_from_events() {
    let h = Harness::new();
    h.resolver.answer(&url("demo"), Answer::Hash("abc123"));

    let settings = ControllerSettings {
        workers: 2,
        resync_interval: Duration::from_secs(3600),
        reconcile_timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(100),
    };
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let controller = Controller::new(h.ctx.clone(), settings);
    let running = tokio::spawn(controller.run(async move {
        let _ = stop_rx.await;
    }));

    h.create_project("demo", "alpine:3").await;

    let job = wait_for(|| async { h.jobs().get_opt(&key("demo-abc123")).await.unwrap() }).await;
    assert_eq!(job.spec.revision_ref, "demo-abc123");

    h.report("demo-abc123", counters(0, 1, 0)).await;

    wait_for(|| async {
        h.revisions()
            .get_opt(&key("demo-abc123"))
            .await
            .unwrap()
            .filter(|revision| revision.status.state == RevisionState::Ready)
    })
    .await;

    assert_eq!(h.revisions().list(None).await.unwrap().len(), 1);
    assert_eq!(h.jobs().list(None).await.unwrap().len(), 1);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
}

async fn wait_for<T, F, Fut>(probe: F) -> T
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe().await {
            return value;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
