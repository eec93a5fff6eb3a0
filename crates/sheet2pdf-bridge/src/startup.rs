//! Finishing an Excel session whose setup may fail half way.

/// Run `setup` against a freshly obtained `app`.
///
/// When setup fails and `app` was started by us rather than attached to,
/// `quit` is called before the error is returned so the new instance does
/// not linger without an owner. An attached instance is never quit.
pub fn setup_or_quit<A, T>(
    app: &A,
    attached: bool,
    setup: impl FnOnce(&A) -> Result<T, String>,
    quit: impl FnOnce(&A) -> Result<(), String>,
) -> Result<T, String> {
    let err = match setup(app) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if !attached {
        match quit(app) {
            Ok(()) => tracing::info!("Quit Excel after failed setup"),
            Err(e) => tracing::warn!("Failed to quit Excel after failed setup: {e}"),
        }
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct App {
        quits: Cell<u32>,
    }

    fn quit(app: &App) -> Result<(), String> {
        app.quits.set(app.quits.get() + 1);
        Ok(())
    }

    fn broken(_: &App) -> Result<(), String> {
        Err("Put Visible failed".to_string())
    }

    #[test]
    fn test_started_instance_is_quit_when_setup_fails() {
        let app = App::default();
        let result = setup_or_quit(&app, false, broken, quit);
        assert_eq!(result, Err("Put Visible failed".to_string()));
        assert_eq!(app.quits.get(), 1);
    }

    #[test]
    fn test_attached_instance_is_left_running() {
        let app = App::default();
        assert!(setup_or_quit(&app, true, broken, quit).is_err());
        assert_eq!(app.quits.get(), 0);
    }

    #[test]
    fn test_successful_setup_keeps_instance() {
        let app = App::default();
        assert_eq!(setup_or_quit(&app, false, |_| Ok(7), quit), Ok(7));
        assert_eq!(app.quits.get(), 0);
    }

    #[test]
    fn test_setup_error_wins_over_quit_error() {
        let app = App::default();
        let result = setup_or_quit(&app, false, broken, |_| Err("RPC server unavailable".to_string()));
        assert_eq!(result, Err("Put Visible failed".to_string()));
    }
}
