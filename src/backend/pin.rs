//! Pinning of Java arrays for raw access inside the kernel
//!
//! [`PinLadder::pin`] hands out the acquire and release fragments of a buffer
//! as one [`PinnedBuffer`]. A failed acquire jumps to a label that sits in
//! the release fragment of the buffer pinned just before it, so it unwinds
//! exactly the buffers that were already pinned, in reverse order.

use itertools::Itertools;

/// Matching acquire and release fragments of one buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedBuffer {
    pub name: String,
    pub acquire: String,
    pub release: String,
}

#[derive(Debug, Default)]
pub struct PinLadder {
    pinned: Vec<PinnedBuffer>,
}

impl PinLadder {
    /// A ladder that starts with the destination buffer. When the
    /// destination cannot be pinned the kernel returns before doing anything
    pub fn with_destination(array: &str, pointer: &str) -> Self {
        let acquire = format!(
            "jint *{pointer} = (jint *)(*env)->GetPrimitiveArrayCritical(env, {array}, 0);\n\
             if ({pointer} == NULL) return;"
        );
        let release =
            format!("(*env)->ReleasePrimitiveArrayCritical(env, {array}, {pointer}, pin_mode);");

        Self {
            pinned: vec![PinnedBuffer {
                name: pointer.to_owned(),
                acquire,
                release,
            }],
        }
    }

    /// Pins input `array` into `pointer`. Inputs are only read, so they are
    /// always released without copying back
    pub fn pin(&mut self, array: &str, pointer: &str, element: &str) -> &PinnedBuffer {
        let failure = match self.pinned.last() {
            Some(previous) => format!(
                "if ({pointer} == NULL) {{ pin_mode = JNI_ABORT; goto release_{}; }}",
                previous.name
            ),
            None => format!("if ({pointer} == NULL) return;"),
        };
        let acquire = format!(
            "{element} *{pointer} = ({element} *)(*env)->GetPrimitiveArrayCritical(env, {array}, 0);\n\
             {failure}"
        );

        let mut release = format!(
            "(*env)->ReleasePrimitiveArrayCritical(env, {array}, {pointer}, JNI_ABORT);"
        );
        if let Some(previous) = self.pinned.last() {
            release.push_str(&format!("\nrelease_{}:", previous.name));
        }

        self.pinned.push(PinnedBuffer {
            name: pointer.to_owned(),
            acquire,
            release,
        });

        &self.pinned[self.pinned.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    /// Unwind labels placed in the release fragments, each with the buffer
    /// it releases
    pub fn labels(&self) -> impl Iterator<Item = (&str, String)> {
        let placed = self.pinned.len().saturating_sub(1);
        self.pinned[..placed]
            .iter()
            .map(|p| (p.name.as_str(), format!("release_{}", p.name)))
    }

    /// All acquires in pin order
    pub fn acquire(&self) -> String {
        self.pinned.iter().map(|p| &p.acquire).join("\n")
    }

    /// All releases in reverse pin order
    pub fn release(&self) -> String {
        self.pinned.iter().rev().map(|p| &p.release).join("\n")
    }
}
