//! Browser-side snippets shipped with tool descriptors.
//!
//! Keeping the injected JavaScript here as data (rather than woven through
//! handlers) keeps every script auditable in one place and the handlers
//! uniform.

/// Scroll the page or an element into position; returns the resulting
/// window offsets.
pub const SCROLL: &str = r#"
    const selector = arguments[0];
    const x = arguments[1];
    const y = arguments[2];
    if (selector) {
        const el = document.querySelector(selector);
        if (!el) { return { ok: false, reason: 'no-element' }; }
        el.scrollIntoView({ block: 'center', inline: 'nearest' });
    } else {
        window.scrollTo(x, y);
    }
    return { ok: true, x: window.scrollX, y: window.scrollY };
"#;

/// Inject a script tag with the given source text or src URL.
pub const INJECT_SCRIPT_TAG: &str = r#"
    const src = arguments[0];
    const text = arguments[1];
    const tag = document.createElement('script');
    if (src) { tag.src = src; } else { tag.textContent = text; }
    document.head.appendChild(tag);
    return true;
"#;

/// Enumerate frames visible to the current browsing context.
pub const LIST_FRAMES: &str = r#"
    const frames = [];
    const nodes = document.querySelectorAll('iframe, frame');
    for (let i = 0; i < nodes.length; i++) {
        const f = nodes[i];
        frames.push({
            index: i,
            name: f.name || null,
            src: f.src || null,
            id: f.id || null
        });
    }
    return frames;
"#;

/// Install the network-capture hook around fetch and XHR.
pub const NETWORK_CAPTURE_START: &str = r#"
    if (window.__bcNetwork) { return false; }
    const log = [];
    window.__bcNetwork = { log: log, blocked: [] };

    const record = (entry) => { if (log.length < 5000) { log.push(entry); } };
    const isBlocked = (url) =>
        window.__bcNetwork.blocked.some((p) => String(url).indexOf(p) !== -1);

    const origFetch = window.fetch;
    window.fetch = function(input, init) {
        const url = (typeof input === 'string') ? input : input.url;
        const method = (init && init.method) || 'GET';
        const started = new Date().toISOString();
        const t0 = performance.now();
        if (isBlocked(url)) {
            record({ url: url, method: method, started: started, status: 0,
                     durationMs: 0, error: 'blocked' });
            return Promise.reject(new TypeError('request blocked'));
        }
        return origFetch.apply(this, arguments).then((resp) => {
            record({ url: url, method: method, started: started,
                     status: resp.status, durationMs: performance.now() - t0,
                     responseBodySize: Number(resp.headers.get('content-length')) || 0,
                     resourceType: 'fetch' });
            return resp;
        }, (err) => {
            record({ url: url, method: method, started: started, status: 0,
                     durationMs: performance.now() - t0, error: String(err) });
            throw err;
        });
    };

    const origOpen = XMLHttpRequest.prototype.open;
    const origSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.open = function(method, url) {
        this.__bc = { method: method, url: url };
        return origOpen.apply(this, arguments);
    };
    XMLHttpRequest.prototype.send = function(body) {
        const meta = this.__bc || { method: 'GET', url: '' };
        const started = new Date().toISOString();
        const t0 = performance.now();
        if (isBlocked(meta.url)) {
            record({ url: meta.url, method: meta.method, started: started,
                     status: 0, durationMs: 0, error: 'blocked' });
            this.abort();
            return;
        }
        this.addEventListener('loadend', () => {
            record({ url: meta.url, method: meta.method, started: started,
                     status: this.status, durationMs: performance.now() - t0,
                     requestBodySize: body ? String(body).length : 0,
                     resourceType: 'xhr' });
        });
        return origSend.apply(this, arguments);
    };
    return true;
"#;

/// Drain the capture log; leaves the hook installed.
pub const NETWORK_CAPTURE_DRAIN: &str = r#"
    if (!window.__bcNetwork) { return null; }
    const rows = window.__bcNetwork.log.slice();
    window.__bcNetwork.log.length = 0;
    return rows;
"#;

/// Replace the set of blocked URL substrings.
pub const NETWORK_BLOCK: &str = r#"
    if (!window.__bcNetwork) { return false; }
    window.__bcNetwork.blocked = arguments[0] || [];
    return true;
"#;

/// Navigation-timing snapshot for the performance tools.
pub const PERFORMANCE_METRICS: &str = r#"
    const out = { url: location.href };
    const nav = performance.getEntriesByType('navigation')[0];
    if (nav) {
        out.domContentLoadedMs = nav.domContentLoadedEventEnd - nav.startTime;
        out.loadMs = nav.loadEventEnd > 0 ? nav.loadEventEnd - nav.startTime : null;
        out.transferSize = nav.transferSize || 0;
        out.responseStatus = nav.responseStatus || null;
    }
    if (performance.memory) {
        out.jsHeapUsed = performance.memory.usedJSHeapSize;
        out.jsHeapLimit = performance.memory.jsHeapSizeLimit;
    }
    return out;
"#;

/// Resource-timing sample, newest `limit` entries.
pub const PERFORMANCE_RESOURCES: &str = r#"
    const limit = arguments[0] || 100;
    return performance.getEntriesByType('resource').slice(-limit).map((r) => ({
        url: r.name,
        started: new Date(performance.timeOrigin + r.startTime).toISOString(),
        durationMs: r.duration,
        responseBodySize: r.transferSize || 0,
        resourceType: r.initiatorType,
        method: 'GET',
        status: r.responseStatus || 200
    }));
"#;

/// Layout/paint analysis for the render tool.
pub const RENDER_ANALYSIS: &str = r#"
    const paints = {};
    performance.getEntriesByType('paint').forEach((p) => {
        paints[p.name] = p.startTime;
    });
    const nodes = document.querySelectorAll('*').length;
    const layoutShift = performance.getEntriesByType('layout-shift')
        .reduce((acc, e) => acc + (e.hadRecentInput ? 0 : e.value), 0);
    return {
        domNodes: nodes,
        firstPaintMs: paints['first-paint'] || null,
        firstContentfulPaintMs: paints['first-contentful-paint'] || null,
        cumulativeLayoutShift: layoutShift,
        viewport: { width: window.innerWidth, height: window.innerHeight }
    };
"#;

/// Enumerate media elements and their coarse state.
pub const MEDIA_DETECT: &str = r#"
    const rows = [];
    document.querySelectorAll('video, audio').forEach((m, i) => {
        rows.push({
            index: i,
            kind: m.tagName.toLowerCase(),
            src: m.currentSrc || m.src || null,
            paused: m.paused,
            muted: m.muted,
            durationS: Number.isFinite(m.duration) ? m.duration : null
        });
    });
    return rows;
"#;

/// Detailed state for one media element.
pub const MEDIA_STATE: &str = r#"
    const index = arguments[0] || 0;
    const m = document.querySelectorAll('video, audio')[index];
    if (!m) { return null; }
    return {
        kind: m.tagName.toLowerCase(),
        src: m.currentSrc || m.src || null,
        paused: m.paused,
        ended: m.ended,
        muted: m.muted,
        volume: m.volume,
        currentTimeS: m.currentTime,
        durationS: Number.isFinite(m.duration) ? m.duration : null,
        readyState: m.readyState,
        networkState: m.networkState,
        playbackRate: m.playbackRate
    };
"#;

/// Apply a control verb to one media element.
pub const MEDIA_CONTROL: &str = r#"
    const index = arguments[0] || 0;
    const verb = arguments[1];
    const value = arguments[2];
    const m = document.querySelectorAll('video, audio')[index];
    if (!m) { return { ok: false, reason: 'no-media' }; }
    switch (verb) {
        case 'play': m.play(); break;
        case 'pause': m.pause(); break;
        case 'mute': m.muted = true; break;
        case 'unmute': m.muted = false; break;
        case 'seek': m.currentTime = value || 0; break;
        case 'volume': m.volume = Math.min(1, Math.max(0, value || 0)); break;
        default: return { ok: false, reason: 'unknown-verb' };
    }
    return { ok: true, paused: m.paused, muted: m.muted, currentTimeS: m.currentTime };
"#;

/// Sample playback progress twice to decide whether time is advancing.
pub const MEDIA_PLAYBACK_PROBE: &str = r#"
    const index = arguments[0] || 0;
    const m = document.querySelectorAll('video, audio')[index];
    if (!m) { return null; }
    return { currentTimeS: m.currentTime, paused: m.paused, ended: m.ended,
             readyState: m.readyState };
"#;

/// Read cookies-adjacent web storage.
pub const STORAGE_GET: &str = r#"
    const area = arguments[0] === 'session' ? sessionStorage : localStorage;
    const out = {};
    for (let i = 0; i < area.length; i++) {
        const key = area.key(i);
        out[key] = area.getItem(key);
    }
    return out;
"#;

/// Write one web-storage entry.
pub const STORAGE_SET: &str = r#"
    const area = arguments[0] === 'session' ? sessionStorage : localStorage;
    area.setItem(arguments[1], arguments[2]);
    return true;
"#;

/// Clear one web-storage area.
pub const STORAGE_CLEAR: &str = r#"
    const area = arguments[0] === 'session' ? sessionStorage : localStorage;
    area.clear();
    return true;
"#;
