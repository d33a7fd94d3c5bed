//! Embedded extraction scripts (§4.F), following the corpus convention
//! (`page_extractor::js_scripts`) of shipping page-evaluated JavaScript as
//! module-level string constants invoked through `Page::evaluate`.

/// Dispatches two synthetic mouse-move events and waits two animation
/// frames, giving lazily-initialized ad-tech scripts that key off pointer
/// activity a chance to react before extraction runs. Mouse simulation goes
/// through `evaluate` rather than a native input API so it stays on the
/// same contract every other probe step already uses.
pub const SETTLE_SCRIPT: &str = r#"(() => {
    return new Promise((resolve) => {
        const fire = (x, y) => {
            document.dispatchEvent(new MouseEvent('mousemove', { clientX: x, clientY: y, bubbles: true }));
        };
        fire(120, 140);
        requestAnimationFrame(() => {
            fire(360, 420);
            requestAnimationFrame(() => resolve(true));
        });
    });
})()"#;

/// Reads the rendered title and a short body-text prefix, used to detect a
/// parked-domain placeholder page before extraction is attempted.
pub const PARK_CHECK_SCRIPT: &str = r#"(() => {
    const title = document.title || '';
    const bodyPrefix = (document.body && document.body.innerText || '').slice(0, 500);
    return { title, bodyPrefix };
})()"#;

/// Reads the known ad-tech globals and walks `window._pbjsGlobals` for
/// Prebid instances. Reports a `detached` sentinel instead of letting the
/// evaluate call itself fail, so the probe can tell a frame detach apart
/// from a genuine extraction error.
pub const EXTRACTION_SCRIPT: &str = r#"(() => {
    try {
        const knownGlobals = ['apstag', 'googletag', 'ats'];
        const libraries = knownGlobals.filter((name) => window[name] !== undefined);

        const globalNames = Array.isArray(window._pbjsGlobals) ? window._pbjsGlobals : [];
        const prebidInstances = globalNames.map((name) => {
            const instance = window[name];
            const version = (instance && instance.version) || '';
            const modules = (instance && Array.isArray(instance.installedModules))
                ? instance.installedModules
                : [];
            const hasVersion = version.length > 0;
            const hasModules = modules.length > 0;
            const initState = (hasVersion && hasModules) ? 'complete' : (hasVersion || hasModules) ? 'partial' : 'queue';
            return { globalVarName: name, version, modules, initState };
        });

        return { ok: true, detached: false, libraries, prebidInstances };
    } catch (e) {
        return { ok: false, detached: true, libraries: [], prebidInstances: [], error: String((e && e.message) || e) };
    }
})()"#;
