use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

use super::Plugin;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// No OS constraint.
    #[default]
    Any,
    Linux,
    Windows,
    Darwin,
    /// Linux or Darwin.
    Unix,
}

impl Os {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::Darwin
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(unix) {
            Os::Unix
        } else {
            Os::Any
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Any => "any",
            Os::Linux => "linux",
            Os::Windows => "windows",
            Os::Darwin => "darwin",
            Os::Unix => "unix",
        }
    }

    /// Whether an environment running `env` satisfies a requirement of `self`.
    fn satisfied_by(self, env: Os) -> bool {
        match self {
            Os::Any => true,
            Os::Unix => matches!(env, Os::Linux | Os::Darwin | Os::Unix),
            required => required == env,
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a plugin needs from the scanning environment, or what the
/// environment provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub os: Os,
    /// Files are on a real filesystem the plugin may access directly.
    pub direct_fs: bool,
    /// The scan runs on the live system being scanned (processes, commands).
    pub running_system: bool,
    pub network: bool,
}

impl Capabilities {
    /// An environment providing everything, on the given OS.
    pub fn all(os: Os) -> Self {
        Self {
            os,
            direct_fs: true,
            running_system: true,
            network: true,
        }
    }
}

/// Checks that `env` satisfies every requirement `plugin` declares.
pub fn validate_requirements<P: Plugin + ?Sized>(
    plugin: &P,
    env: &Capabilities,
) -> Result<(), CapabilityError> {
    let required = plugin.requirements();
    let name = plugin.name().to_string();

    if !required.os.satisfied_by(env.os) {
        return Err(CapabilityError::OsMismatch {
            plugin: name,
            required: required.os,
            actual: env.os,
        });
    }
    if required.direct_fs && !env.direct_fs {
        return Err(CapabilityError::MissingDirectFs { plugin: name });
    }
    if required.running_system && !env.running_system {
        return Err(CapabilityError::MissingRunningSystem { plugin: name });
    }
    if required.network && !env.network {
        return Err(CapabilityError::MissingNetwork { plugin: name });
    }
    Ok(())
}

/// Returns the plugins whose requirements `env` satisfies.
pub fn filter_by_capabilities<P: Plugin>(plugins: Vec<P>, env: &Capabilities) -> Vec<P> {
    plugins
        .into_iter()
        .filter(|p| validate_requirements(p, env).is_ok())
        .collect()
}

/// Whether `name` is a valid plugin name (`^[a-z0-9/-]+$`).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '/' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        requirements: Capabilities,
    }

    impl Plugin for Fake {
        fn name(&self) -> &str {
            "fake/plugin"
        }

        fn version(&self) -> u32 {
            0
        }

        fn requirements(&self) -> Capabilities {
            self.requirements
        }
    }

    fn requiring(requirements: Capabilities) -> Fake {
        Fake { requirements }
    }

    #[test]
    fn test_os_mismatch_is_rejected() {
        let plugin = requiring(Capabilities {
            os: Os::Windows,
            ..Default::default()
        });
        let env = Capabilities {
            os: Os::Linux,
            ..Default::default()
        };

        let err = validate_requirements(&plugin, &env).unwrap_err();
        assert_eq!(
            err,
            CapabilityError::OsMismatch {
                plugin: "fake/plugin".into(),
                required: Os::Windows,
                actual: Os::Linux,
            }
        );
        assert!(err.to_string().contains("fake/plugin"));
    }

    #[test]
    fn test_unix_accepts_linux_and_darwin() {
        let plugin = requiring(Capabilities {
            os: Os::Unix,
            ..Default::default()
        });
        for os in [Os::Linux, Os::Darwin] {
            assert!(validate_requirements(&plugin, &Capabilities { os, ..Default::default() }).is_ok());
        }
        assert!(validate_requirements(
            &plugin,
            &Capabilities {
                os: Os::Windows,
                ..Default::default()
            }
        )
        .is_err());
    }

    #[test]
    fn test_missing_capabilities() {
        let env = Capabilities {
            os: Os::Linux,
            ..Default::default()
        };

        let fs = requiring(Capabilities {
            direct_fs: true,
            ..Default::default()
        });
        assert!(matches!(
            validate_requirements(&fs, &env),
            Err(CapabilityError::MissingDirectFs { .. })
        ));

        let running = requiring(Capabilities {
            running_system: true,
            ..Default::default()
        });
        assert!(matches!(
            validate_requirements(&running, &env),
            Err(CapabilityError::MissingRunningSystem { .. })
        ));

        let network = requiring(Capabilities {
            network: true,
            ..Default::default()
        });
        assert!(matches!(
            validate_requirements(&network, &env),
            Err(CapabilityError::MissingNetwork { .. })
        ));

        assert!(validate_requirements(&network, &Capabilities::all(Os::Linux)).is_ok());
    }

    #[test]
    fn test_filter_by_capabilities() {
        let plugins = vec![
            requiring(Capabilities::default()),
            requiring(Capabilities {
                network: true,
                ..Default::default()
            }),
        ];
        let env = Capabilities {
            os: Os::Linux,
            direct_fs: true,
            ..Default::default()
        };
        assert_eq!(filter_by_capabilities(plugins, &env).len(), 1);
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("os/apk"));
        assert!(is_valid_name("cve/cve-2024-3094"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("OS/apk"));
        assert!(!is_valid_name("os apk"));
        assert!(!is_valid_name("os_apk"));
    }
}
