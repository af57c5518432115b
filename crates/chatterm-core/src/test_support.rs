use std::cell::Cell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

static ENV_LOCK: Mutex<()> = Mutex::new(());
static NEXT_DIR: AtomicU64 = AtomicU64::new(0);
thread_local! {
    static HOLDS_ENV_LOCK: Cell<bool> = const { Cell::new(false) };
}

/// Temporary directory removed (recursively) on drop. Not created eagerly.
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new(tag: &str) -> Self {
        let tag: String = tag
            .chars()
            .map(|ch| match ch {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
                _ => '-',
            })
            .collect();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let serial = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
        let name = format!("chatterm-{tag}-{}-{nanos}-{serial}", std::process::id());
        Self {
            path: std::env::temp_dir().join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, child: impl AsRef<Path>) -> PathBuf {
        self.path.join(child)
    }

    /// Runs `run` with `HOME` pointing at this directory plus any `extra`
    /// overrides.
    pub fn as_home<R>(&self, extra: &[(&str, Option<&str>)], run: impl FnOnce() -> R) -> R {
        let home = self.path.to_string_lossy();
        let mut vars = vec![("HOME", Some(&*home))];
        vars.extend_from_slice(extra);
        with_env_vars(&vars, run)
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => eprintln!(
                "warning: failed to remove temporary test directory {}: {err}",
                self.path.display()
            ),
        }
    }
}

/// Environment overrides that are undone, newest first, when dropped.
struct EnvOverrides {
    saved: Vec<(String, Option<OsString>)>,
    lock: Option<MutexGuard<'static, ()>>,
}

impl EnvOverrides {
    fn apply(vars: &[(&str, Option<&str>)]) -> Self {
        // Nested calls on the same thread already own the lock.
        let lock = if HOLDS_ENV_LOCK.with(Cell::get) {
            None
        } else {
            let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            HOLDS_ENV_LOCK.with(|held| held.set(true));
            Some(guard)
        };

        let mut saved = Vec::with_capacity(vars.len());
        for (key, value) in vars {
            saved.push(((*key).to_owned(), std::env::var_os(key)));
            // SAFETY: every writer goes through ENV_LOCK.
            unsafe { write_env(key, (*value).map(OsString::from)) };
        }
        Self { saved, lock }
    }
}

impl Drop for EnvOverrides {
    fn drop(&mut self) {
        while let Some((key, previous)) = self.saved.pop() {
            // SAFETY: the lock is still held; it is released after this body.
            unsafe { write_env(&key, previous) };
        }
        if self.lock.is_some() {
            HOLDS_ENV_LOCK.with(|held| held.set(false));
        }
    }
}

unsafe fn write_env(key: &str, value: Option<OsString>) {
    match value {
        Some(value) => unsafe { std::env::set_var(key, value) },
        None => unsafe { std::env::remove_var(key) },
    }
}

pub fn with_env_var<R>(key: &str, value: Option<&str>, run: impl FnOnce() -> R) -> R {
    with_env_vars(&[(key, value)], run)
}

/// Runs `run` with the given variables set (or removed), serialized against
/// every other caller in the process. Calls may nest.
pub fn with_env_vars<R>(vars: &[(&str, Option<&str>)], run: impl FnOnce() -> R) -> R {
    let _overrides = EnvOverrides::apply(vars);
    run()
}

#[cfg(test)]
mod tests {
    use super::*;

    static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

    fn unique_key(prefix: &str) -> String {
        let serial = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{}_{serial}", std::process::id())
    }

    #[test]
    fn with_env_var_restores_previous_value() {
        let key = unique_key("CHATTERM_TEST_ENV");

        with_env_var(&key, Some("before"), || {
            with_env_var(&key, Some("during"), || {
                assert_eq!(std::env::var(&key).expect("inner value"), "during");
            });
            assert_eq!(std::env::var(&key).expect("restored value"), "before");
        });

        assert!(std::env::var(&key).is_err());
    }

    #[test]
    fn with_env_vars_can_remove_a_variable_temporarily() {
        let key = unique_key("CHATTERM_TEST_ENV_REMOVE");

        with_env_var(&key, Some("present"), || {
            with_env_vars(&[(&key, None)], || {
                assert!(std::env::var(&key).is_err());
            });
            assert_eq!(std::env::var(&key).expect("restored value"), "present");
        });
    }

    #[test]
    fn test_dir_paths_are_unique_and_cleaned_up() {
        let first = TestDir::new("helper");
        let second = TestDir::new("helper");
        assert_ne!(first.path(), second.path());

        let lingering = {
            let dir = TestDir::new("cleanup check");
            std::fs::create_dir_all(dir.join("nested")).expect("create nested dir");
            std::fs::write(dir.join("nested/file.txt"), "x").expect("write file");
            assert!(dir.path().to_string_lossy().contains("chatterm-cleanup-check-"));
            dir.path().to_path_buf()
        };

        assert!(!lingering.exists());
    }

    #[test]
    fn as_home_points_home_at_the_directory_and_restores_it() {
        let dir = TestDir::new("home");
        let key = unique_key("CHATTERM_TEST_HOME_EXTRA");
        let before = std::env::var_os("HOME");

        dir.as_home(&[(&key, Some("extra"))], || {
            assert_eq!(std::env::var_os("HOME"), Some(dir.path().as_os_str().to_owned()));
            assert_eq!(std::env::var(&key).expect("extra value"), "extra");
        });

        assert_eq!(std::env::var_os("HOME"), before);
        assert!(std::env::var(&key).is_err());
    }
}
