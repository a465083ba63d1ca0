//! Environment and argument vector sources

use std::ffi::{CStr, OsString};
use std::os::raw::c_char;

/// Read access to a process environment
pub trait EnvSource {
    /// Value of `name`, if set
    fn get(&self, name: &str) -> Option<OsString>;

    /// Every variable, in the source's order
    fn vars(&self) -> Vec<(OsString, OsString)>;
}

/// The environment of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnv;

impl EnvSource for HostEnv {
    fn get(&self, name: &str) -> Option<OsString> {
        std::env::var_os(name)
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        std::env::vars_os().collect()
    }
}

/// An environment captured from `NAME=VALUE` strings, such as the `envp`
/// array handed to a native entry point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEnv {
    vars: Vec<(OsString, OsString)>,
}

impl RawEnv {
    /// Parse `NAME=VALUE` entries; entries without a name are dropped and
    /// the first occurrence of a name wins.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut vars: Vec<(OsString, OsString)> = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            // Skip the first byte so Windows' hidden `=C:=C:\` entries keep
            // their leading `=` in the name.
            let split = match entry.iter().skip(1).position(|&b| b == b'=') {
                Some(pos) => pos + 1,
                None => continue,
            };
            let name = os_string_from_bytes(&entry[..split]);
            if vars.iter().any(|(existing, _)| *existing == name) {
                continue;
            }
            vars.push((name, os_string_from_bytes(&entry[split + 1..])));
        }
        Self { vars }
    }

    /// Capture a null-terminated array of nul-terminated strings.
    ///
    /// # Safety
    ///
    /// `envp` must be null or point to an array of valid C strings ending
    /// with a null pointer, all alive for the duration of the call.
    pub unsafe fn from_ptr(envp: *const *const c_char) -> Self {
        Self::from_entries(c_str_array(envp))
    }
}

impl EnvSource for RawEnv {
    fn get(&self, name: &str) -> Option<OsString> {
        self.vars
            .iter()
            .find(|(existing, _)| existing.as_os_str() == name)
            .map(|(_, value)| value.clone())
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        self.vars.clone()
    }
}

/// Copy a null-terminated array of C strings.
///
/// # Safety
///
/// `array` must be null or point to valid C strings ending with a null
/// pointer.
pub unsafe fn c_str_array(array: *const *const c_char) -> Vec<Vec<u8>> {
    let mut items = Vec::new();
    if array.is_null() {
        return items;
    }
    let mut cursor = array;
    while !(*cursor).is_null() {
        items.push(CStr::from_ptr(*cursor).to_bytes().to_vec());
        cursor = cursor.add(1);
    }
    items
}

/// Platform string from raw bytes; lossy where the platform needs UTF-8
pub fn os_string_from_bytes(bytes: &[u8]) -> OsString {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        OsString::from_vec(bytes.to_vec())
    }
    #[cfg(not(unix))]
    {
        OsString::from(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn test_parse_entries() {
        let env = RawEnv::from_entries([
            "PATH=/usr/bin:/bin",
            "EMPTY=",
            "EQ=a=b",
            "NOVALUE",
            "PATH=/shadowed",
            "=C:=C:\\work",
        ]);

        assert_eq!(env.get("PATH"), Some(OsString::from("/usr/bin:/bin")));
        assert_eq!(env.get("EMPTY"), Some(OsString::new()));
        assert_eq!(env.get("EQ"), Some(OsString::from("a=b")));
        assert_eq!(env.get("NOVALUE"), None);
        assert_eq!(env.get("=C:"), Some(OsString::from("C:\\work")));
        assert_eq!(env.vars().len(), 4);
    }

    #[test]
    fn test_from_ptr() {
        let owned: Vec<CString> = ["HOME=/home/pex", "LANG=C.UTF-8"]
            .iter()
            .map(|s| CString::new(*s).unwrap())
            .collect();
        let mut pointers: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        pointers.push(ptr::null());

        let env = unsafe { RawEnv::from_ptr(pointers.as_ptr()) };
        assert_eq!(env.get("HOME"), Some(OsString::from("/home/pex")));
        assert_eq!(env.get("LANG"), Some(OsString::from("C.UTF-8")));
    }

    #[test]
    fn test_null_array() {
        assert!(unsafe { c_str_array(ptr::null()) }.is_empty());
        assert_eq!(unsafe { RawEnv::from_ptr(ptr::null()) }, RawEnv::default());
    }

    #[test]
    fn test_host_env() {
        let env = HostEnv;
        assert_eq!(env.get("PATH"), std::env::var_os("PATH"));
    }
}
