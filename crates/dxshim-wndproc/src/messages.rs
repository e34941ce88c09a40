//! Window message constants the interceptor reacts to

pub const WM_DESTROY: u32 = 0x0002;
pub const WM_ACTIVATE: u32 = 0x0006;
pub const WM_CLOSE: u32 = 0x0010;
pub const WM_NCDESTROY: u32 = 0x0082;
pub const WM_SYSCOMMAND: u32 = 0x0112;

/// `WM_ACTIVATE` wParam values
pub const WA_INACTIVE: usize = 0;
pub const WA_ACTIVE: usize = 1;

pub const SC_CLOSE: usize = 0xF060;

/// The low four bits of a `WM_SYSCOMMAND` wParam are used by the system
const SC_MASK: usize = 0xFFF0;

/// Messages after which the window is on its way out
pub fn is_closing(msg: u32, wparam: usize) -> bool {
    match msg {
        WM_CLOSE | WM_DESTROY | WM_NCDESTROY => true,
        WM_SYSCOMMAND => wparam & SC_MASK == SC_CLOSE,
        _ => false,
    }
}

/// Name for log output
pub fn name(msg: u32) -> Option<&'static str> {
    Some(match msg {
        WM_DESTROY => "WM_DESTROY",
        WM_ACTIVATE => "WM_ACTIVATE",
        WM_CLOSE => "WM_CLOSE",
        WM_NCDESTROY => "WM_NCDESTROY",
        WM_SYSCOMMAND => "WM_SYSCOMMAND",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_messages() {
        assert!(is_closing(WM_CLOSE, 0));
        assert!(is_closing(WM_DESTROY, 0));
        assert!(is_closing(WM_NCDESTROY, 0));
        assert!(is_closing(WM_SYSCOMMAND, SC_CLOSE));
        assert!(is_closing(WM_SYSCOMMAND, SC_CLOSE | 0x2));
        assert!(!is_closing(WM_SYSCOMMAND, 0xF020)); // SC_MINIMIZE
        assert!(!is_closing(WM_ACTIVATE, 0));
    }

    #[test]
    fn test_names() {
        assert_eq!(name(WM_CLOSE), Some("WM_CLOSE"));
        assert_eq!(name(0x0200), None);
    }
}
