//! Build stack defaults per project type.

pub const DEFAULT_MACOS_STACK: &str = "osx-xcode-13.1.x";
pub const DEFAULT_LINUX_STACK: &str = "linux-docker-android-20.04";

/// Stack suggested for a project type, if the type is known.
pub fn default_stack(project_type: &str) -> Option<&'static str> {
    match project_type {
        "ios" | "macos" | "cordova" | "ionic" | "react-native" | "flutter" => {
            Some(DEFAULT_MACOS_STACK)
        }
        "android" | "other" => Some(DEFAULT_LINUX_STACK),
        _ => None,
    }
}

/// URL of the preinstalled tools report of a stack.
pub fn system_report_url(stack: &str) -> String {
    format!(
        "https://github.com/bitrise-io/bitrise.io/blob/master/system_reports/{}.log",
        stack
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_projects_default_to_macos() {
        for project_type in ["ios", "flutter", "react-native"] {
            assert_eq!(default_stack(project_type), Some(DEFAULT_MACOS_STACK));
        }
    }

    #[test]
    fn android_defaults_to_linux() {
        assert_eq!(default_stack("android"), Some(DEFAULT_LINUX_STACK));
        assert_eq!(default_stack("other"), Some(DEFAULT_LINUX_STACK));
    }

    #[test]
    fn unknown_project_type_has_no_default() {
        assert_eq!(default_stack("xamarin"), None);
        assert_eq!(default_stack(""), None);
    }
}
