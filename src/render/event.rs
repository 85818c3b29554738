use std::ffi::OsString;
use std::fmt;
use std::time::SystemTime;

/// State of one template as last reported by the rendering engine.
///
/// A template may feed several environment variables (several specs sharing
/// the same source); they all receive the same rendered contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderEvent {
    /// Identity of the template.
    pub template_id: String,
    /// When the template last produced output; `None` if it never has.
    pub last_would_render: Option<SystemTime>,
    /// Rendered bytes, exactly as produced.
    pub contents: Vec<u8>,
    /// Environment variables this template renders into.
    pub env_vars: Vec<String>,
}

impl RenderEvent {
    /// Event for a template that has not rendered yet.
    pub fn pending(template_id: impl Into<String>, env_vars: Vec<String>) -> Self {
        Self {
            template_id: template_id.into(),
            last_would_render: None,
            contents: Vec::new(),
            env_vars,
        }
    }

    /// Event for a template rendered at `at`.
    pub fn rendered(
        template_id: impl Into<String>,
        env_vars: Vec<String>,
        contents: impl Into<Vec<u8>>,
        at: SystemTime,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            last_would_render: Some(at),
            contents: contents.into(),
            env_vars,
        }
    }

    /// `true` once the template produced output at least once.
    #[inline]
    pub fn has_rendered(&self) -> bool {
        self.last_would_render.is_some()
    }

    /// One assignment per mapped environment variable.
    pub fn assignments(&self) -> impl Iterator<Item = EnvVar> + '_ {
        let value = bytes_to_os(&self.contents);
        self.env_vars
            .iter()
            .map(move |name| EnvVar::new(name.clone(), value.clone()))
    }
}

/// One `NAME=value` environment assignment.
///
/// The value is kept as an [`OsString`] so rendered bytes reach the child unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: OsString,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value.to_string_lossy())
    }
}

#[cfg(unix)]
fn bytes_to_os(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes.to_vec())
}

#[cfg(not(unix))]
fn bytes_to_os(bytes: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_keeps_content_verbatim() {
        let ev = RenderEvent::rendered(
            "t",
            vec!["A".into(), "B".into()],
            " spaced = value\n",
            SystemTime::now(),
        );
        let got: Vec<_> = ev.assignments().map(|e| e.to_string()).collect();
        assert_eq!(got, vec!["A= spaced = value\n", "B= spaced = value\n"]);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_bytes_survive() {
        use std::os::unix::ffi::OsStrExt;

        let ev = RenderEvent::rendered("t", vec!["BIN".into()], vec![0xff, 0x00, 0x41], SystemTime::now());
        let env = ev.assignments().next().unwrap();
        assert_eq!(env.value.as_bytes(), &[0xff, 0x00, 0x41]);
    }
}
