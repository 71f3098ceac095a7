use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rquickjs::{Context, Ctx, Error as JsError, Function, IntoJs, Runtime, Value};

use crate::binding::{AtomTable, ClassDescriptor, DomState, ScriptEngine, ScriptError, ScriptHeap};
use crate::context::HostCallbacks;
use crate::foundation::{NativeString, NativeValue, SurfaceId, TargetId};

/// QuickJS backend.
///
/// Script wrappers are proxies whose traps call back into the shared
/// [`DomState`] through `__bridge_*` host functions. Values cross as JSON
/// encoded [`NativeValue`]s and target ids as numbers.
pub struct QuickJsEngine {
    runtime: Runtime,
    context: Context,
    surface: SurfaceId,
    callbacks: Arc<HostCallbacks>,
    max_pending_jobs: usize,
}

impl QuickJsEngine {
    /// Create a runtime and context with `console` forwarded to `tracing`
    /// and the host log callback.
    pub fn new(
        surface: SurfaceId,
        callbacks: Arc<HostCallbacks>,
        max_pending_jobs: usize,
    ) -> Result<Self, ScriptError> {
        let runtime = Runtime::new().map_err(engine_error)?;
        let context = Context::full(&runtime).map_err(engine_error)?;
        let engine = Self {
            runtime,
            context,
            surface,
            callbacks,
            max_pending_jobs,
        };
        engine.init_console()?;
        Ok(engine)
    }

    /// Evaluate `source` and convert the completion value into `V`.
    pub fn eval_with<V>(&mut self, source: &str, filename: &str) -> Result<V, ScriptError>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        let script = with_source_url(source, filename, 1);
        let value = self.context.with(|ctx| match ctx.eval::<V, _>(script) {
            Ok(value) => Ok(value),
            Err(JsError::Exception) => Err(ScriptError::Exception {
                message: capture_exception_message(&ctx),
            }),
            Err(err) => Err(engine_error(err)),
        })?;
        self.execute_pending_jobs();
        Ok(value)
    }

    /// Run queued promise jobs (and finalization callbacks) up to the
    /// configured limit.
    fn execute_pending_jobs(&self) {
        let mut job_count = 0;
        while self.runtime.is_job_pending() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {
                    job_count += 1;
                    if job_count >= self.max_pending_jobs {
                        tracing::warn!(
                            target: "quickjs",
                            surface = %self.surface,
                            "stopped processing jobs after {} iterations",
                            self.max_pending_jobs
                        );
                        break;
                    }
                }
                Ok(false) => break,
                Err(job_exception) => {
                    tracing::error!(
                        target: "quickjs",
                        surface = %self.surface,
                        "job execution error: {:?}",
                        job_exception
                    );
                    break;
                }
            }
        }
        if job_count > 0 {
            tracing::debug!(target: "quickjs", surface = %self.surface, "executed {} pending jobs", job_count);
        }
    }

    fn init_console(&self) -> Result<(), ScriptError> {
        let surface = self.surface;
        let callbacks = Arc::clone(&self.callbacks);
        self.context
            .with(|ctx| {
                let global = ctx.globals();
                let log_fn = Function::new(
                    ctx.clone(),
                    move |level: String, message: String| -> rquickjs::Result<()> {
                        forward_log(surface, &callbacks, &level, &message);
                        Ok(())
                    },
                )?
                .with_name("__bridge_log")?;
                global.set("__bridge_log", log_fn)?;
                ctx.eval::<(), _>(CONSOLE_BOOTSTRAP.as_bytes())
            })
            .map_err(engine_error)
    }

    fn call_global<'js, A>(ctx: &Ctx<'js>, name: &str, args: A) -> Result<(), ScriptError>
    where
        A: rquickjs::function::IntoArgs<'js>,
    {
        let function: Function = ctx.globals().get(name).map_err(engine_error)?;
        match function.call::<_, ()>(args) {
            Ok(()) => Ok(()),
            Err(JsError::Exception) => Err(ScriptError::Exception {
                message: capture_exception_message(ctx),
            }),
            Err(err) => Err(engine_error(err)),
        }
    }
}

impl ScriptEngine for QuickJsEngine {
    fn name(&self) -> &'static str {
        "quickjs"
    }

    fn new_heap(&self) -> Box<dyn ScriptHeap> {
        Box::new(AtomTable::new())
    }

    fn bind(&mut self, state: Rc<RefCell<DomState>>) -> Result<(), ScriptError> {
        let surface = self.surface;
        let callbacks = Arc::clone(&self.callbacks);
        self.context
            .with(|ctx| {
                install_host_functions(&ctx, state, surface, callbacks)?;
                match ctx.eval::<(), _>(BINDING_PRELUDE.as_bytes()) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        if let JsError::Exception = err {
                            let value: Value<'_> = ctx.catch();
                            tracing::error!(target: "quickjs", "binding prelude failed: {:?}", value);
                        }
                        Err(err)
                    }
                }
            })
            .map_err(engine_error)
    }

    fn define_class(&mut self, class: &ClassDescriptor) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            Self::call_global(
                &ctx,
                "__bridge_define_class",
                (
                    class.name,
                    class.parent,
                    class.constructible,
                    class.methods.to_vec(),
                ),
            )
        })
    }

    fn expose_document(&mut self, document: TargetId) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            Self::call_global(&ctx, "__bridge_install_document", (document.get() as f64,))
        })
    }

    fn evaluate_script(
        &mut self,
        source: &NativeString,
        url: &str,
        start_line: i32,
    ) -> Result<(), ScriptError> {
        let script = with_source_url(&script_text(source), url, start_line);
        let result = self.context.with(|ctx| match ctx.eval::<(), _>(script) {
            Ok(()) => Ok(()),
            Err(JsError::Exception) => Err(ScriptError::Exception {
                message: capture_exception_message(&ctx),
            }),
            Err(err) => Err(engine_error(err)),
        });
        // Jobs queued before a throw still run.
        self.execute_pending_jobs();
        result
    }

    fn invoke_module_event(
        &mut self,
        module: &NativeString,
        event_type: &str,
        event: Option<TargetId>,
        extra: &NativeValue,
    ) -> Result<NativeValue, ScriptError> {
        let extra = encode_value(extra)?;
        let module = module.to_string_lossy();
        let result = self.context.with(|ctx| {
            let dispatch: Function = ctx
                .globals()
                .get("__bridge_dispatch_module_event")
                .map_err(engine_error)?;
            let args = (module, event_type, event.map(|target| target.get() as f64), extra);
            match dispatch.call::<_, Option<String>>(args) {
                Ok(value) => Ok(value),
                Err(JsError::Exception) => Err(ScriptError::Exception {
                    message: capture_exception_message(&ctx),
                }),
                Err(err) => Err(engine_error(err)),
            }
        });
        self.execute_pending_jobs();
        match result? {
            Some(raw) => decode_value(&raw),
            None => Ok(NativeValue::Null),
        }
    }
}

fn install_host_functions(
    ctx: &Ctx<'_>,
    state: Rc<RefCell<DomState>>,
    surface: SurfaceId,
    callbacks: Arc<HostCallbacks>,
) -> rquickjs::Result<()> {
    let global = ctx.globals();

    // Construction and lifetime
    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, class: String, args: String| -> rquickjs::Result<f64> {
                with_state(&ctx, &state_ref, |state| {
                    let args = decode_args(&args)?;
                    Ok(state.construct(&class, &args)?.get() as f64)
                })
            },
        )?
        .with_name("__bridge_construct")?;
        global.set("__bridge_construct", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64| -> rquickjs::Result<()> {
                with_state(&ctx, &state_ref, |state| {
                    state.finalize(target(id));
                    Ok(())
                })
            },
        )?
        .with_name("__bridge_finalize")?;
        global.set("__bridge_finalize", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64| -> rquickjs::Result<()> {
                with_state(&ctx, &state_ref, |state| state.adopt(target(id)))
            },
        )?
        .with_name("__bridge_adopt")?;
        global.set("__bridge_adopt", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64| -> rquickjs::Result<String> {
                with_state(&ctx, &state_ref, |state| {
                    Ok(state.class_of(target(id))?.to_string())
                })
            },
        )?
        .with_name("__bridge_class_of")?;
        global.set("__bridge_class_of", func)?;
    }

    // Property traps
    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64, name: String| -> rquickjs::Result<Option<String>> {
                with_state(&ctx, &state_ref, |state| {
                    state
                        .get_property(target(id), &name)?
                        .map(|value| encode_value(&value))
                        .transpose()
                })
            },
        )?
        .with_name("__bridge_get")?;
        global.set("__bridge_get", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64, name: String, value: String| -> rquickjs::Result<()> {
                with_state(&ctx, &state_ref, |state| {
                    let value = decode_value(&value)?;
                    state.set_property(target(id), &name, &value)
                })
            },
        )?
        .with_name("__bridge_set")?;
        global.set("__bridge_set", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64, name: String| -> rquickjs::Result<bool> {
                with_state(&ctx, &state_ref, |state| {
                    state.delete_property(target(id), &name)
                })
            },
        )?
        .with_name("__bridge_delete")?;
        global.set("__bridge_delete", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64| -> rquickjs::Result<Vec<String>> {
                with_state(&ctx, &state_ref, |state| state.property_names(target(id)))
            },
        )?
        .with_name("__bridge_keys")?;
        global.set("__bridge_keys", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>,
                  id: f64,
                  name: String,
                  args: String|
                  -> rquickjs::Result<Option<String>> {
                with_state(&ctx, &state_ref, |state| {
                    let args = decode_args(&args)?;
                    state
                        .call_method(target(id), &name, &args)?
                        .map(|value| encode_value(&value))
                        .transpose()
                })
            },
        )?
        .with_name("__bridge_call")?;
        global.set("__bridge_call", func)?;
    }

    {
        let state_ref = Rc::clone(&state);
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, id: f64, op: String, args: String| -> rquickjs::Result<String> {
                with_state(&ctx, &state_ref, |state| {
                    let args = decode_args(&args)?;
                    encode_value(&state.invoke_style(target(id), &op, &args)?)
                })
            },
        )?
        .with_name("__bridge_style")?;
        global.set("__bridge_style", func)?;
    }

    // Script to host module channel
    {
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>,
                  module: String,
                  method: String,
                  params: String|
                  -> rquickjs::Result<String> {
                let params = match decode_value(&params) {
                    Ok(params) => params,
                    Err(err) => return script_error(&ctx, err),
                };
                let result = callbacks.invoke_module(surface, &module, &method, &params);
                match encode_value(&result) {
                    Ok(encoded) => Ok(encoded),
                    Err(err) => script_error(&ctx, err),
                }
            },
        )?
        .with_name("__bridge_invoke_module")?;
        global.set("__bridge_invoke_module", func)?;
    }

    Ok(())
}

/// Run `f` against the DOM state and raise its error into script.
fn with_state<T>(
    ctx: &Ctx<'_>,
    state: &RefCell<DomState>,
    f: impl FnOnce(&mut DomState) -> Result<T, ScriptError>,
) -> rquickjs::Result<T> {
    let result = match state.try_borrow_mut() {
        Ok(mut state) => f(&mut state),
        Err(_) => Err(ScriptError::Engine("DOM state is already in use".into())),
    };
    match result {
        Ok(value) => Ok(value),
        Err(err) => script_error(ctx, err),
    }
}

/// Thrown as `"<ErrorName>: <message>"`; the prelude turns it into an error
/// object of that name.
fn script_error<T>(ctx: &Ctx<'_>, err: ScriptError) -> rquickjs::Result<T> {
    tracing::debug!(target: "quickjs", error = %err, "binding call raised");
    let message = format!("{}: {}", err.js_name(), err.detail());
    let value = message.into_js(ctx)?;
    Err(ctx.throw(value))
}

fn forward_log(surface: SurfaceId, callbacks: &HostCallbacks, level: &str, message: &str) {
    let level = match level {
        "error" => {
            tracing::error!(target: "quickjs", surface = %surface, "{message}");
            tracing::Level::ERROR
        }
        "warn" => {
            tracing::warn!(target: "quickjs", surface = %surface, "{message}");
            tracing::Level::WARN
        }
        "debug" => {
            tracing::debug!(target: "quickjs", surface = %surface, "{message}");
            tracing::Level::DEBUG
        }
        _ => {
            tracing::info!(target: "quickjs", surface = %surface, "{message}");
            tracing::Level::INFO
        }
    };
    callbacks.log(surface, level, message);
}

fn target(id: f64) -> TargetId {
    TargetId(id as u64)
}

fn encode_value(value: &NativeValue) -> Result<String, ScriptError> {
    Ok(serde_json::to_string(value)?)
}

fn decode_value(raw: &str) -> Result<NativeValue, ScriptError> {
    Ok(serde_json::from_str(raw)?)
}

fn decode_args(raw: &str) -> Result<Vec<NativeValue>, ScriptError> {
    Ok(serde_json::from_str(raw)?)
}

fn engine_error(err: JsError) -> ScriptError {
    ScriptError::Engine(err.to_string())
}

fn capture_exception_message(ctx: &Ctx<'_>) -> String {
    let exception: Value = ctx.catch();

    if let Some(obj) = exception.as_object() {
        if let Ok(message) = obj.get::<_, String>("message") {
            let name = obj
                .get::<_, String>("name")
                .unwrap_or_else(|_| "Error".to_string());
            if let Ok(stack) = obj.get::<_, String>("stack") {
                if !stack.is_empty() {
                    return format!("{name}: {message}\n{stack}");
                }
            }
            return format!("{name}: {message}");
        }
    }
    if let Some(text) = exception.as_string().and_then(|text| text.to_string().ok()) {
        return text;
    }
    format!("{:?}", exception)
}

/// Source text for the engine. Unpaired surrogates, which UTF-8 cannot carry,
/// are written back as `\uXXXX` escapes so string literals keep them.
fn script_text(source: &NativeString) -> String {
    let mut text = String::with_capacity(source.len());
    for unit in char::decode_utf16(source.as_utf16().iter().copied()) {
        match unit {
            Ok(ch) => text.push(ch),
            Err(err) => text.push_str(&format!("\\u{:04X}", err.unpaired_surrogate())),
        }
    }
    text
}

/// Pad so the first source line reports as `start_line`, then name the
/// script for stack traces.
fn with_source_url(source: &str, filename: &str, start_line: i32) -> Vec<u8> {
    let padding = start_line.max(1) as usize - 1;
    let mut script = String::with_capacity(padding + source.len() + filename.len() + 32);
    script.extend(std::iter::repeat('\n').take(padding));
    script.push_str(source);
    if !source.ends_with('\n') {
        script.push('\n');
    }
    script.push_str("//# sourceURL=");
    script.push_str(filename);
    script.push('\n');
    script.into_bytes()
}

const CONSOLE_BOOTSTRAP: &str = r#"
(() => {
    const format = (args) => args.map((arg) => {
        if (typeof arg === 'string') return arg;
        try {
            const json = JSON.stringify(arg);
            return json === undefined ? String(arg) : json;
        } catch (_) {
            return String(arg);
        }
    }).join(' ');
    const console = {};
    for (const [method, level] of [
        ['log', 'info'], ['info', 'info'], ['warn', 'warn'],
        ['error', 'error'], ['debug', 'debug'], ['trace', 'debug'],
    ]) {
        console[method] = (...args) => __bridge_log(level, format(args));
    }
    globalThis.console = console;
})();
"#;

const BINDING_PRELUDE: &str = r#"
(() => {
    const g = globalThis;
    const ID = Symbol('bridge.id');
    const ids = new WeakMap();
    const STYLE = Symbol('bridge.style');
    const styleOwners = new WeakMap();
    const classes = new Map();
    const cache = new Map();
    const listeners = [];
    const weak = typeof WeakRef === 'function' && typeof FinalizationRegistry === 'function';
    let epoch = 0;
    let documentId = -1;

    // A node whose wrapper is collected is finalized unless a newer wrapper
    // for the same id was created in the meantime.
    const registry = weak ? new FinalizationRegistry((token) => {
        const entry = cache.get(token.id);
        if (entry && entry.epoch === token.epoch) {
            cache.delete(token.id);
            __bridge_finalize(token.id);
        }
    }) : null;

    const raise = (error) => {
        if (typeof error !== 'string') throw error;
        const split = error.indexOf(': ');
        const name = split > 0 ? error.slice(0, split) : 'Error';
        const message = split > 0 ? error.slice(split + 2) : error;
        if (name === 'TypeError') throw new TypeError(message);
        const err = new Error(message);
        err.name = name;
        throw err;
    };

    const host = (fn, ...args) => {
        try {
            return fn(...args);
        } catch (error) {
            raise(error);
        }
    };

    // Strings with unpaired surrogates cross as code unit arrays.
    const wellFormed = (text) => {
        for (let i = 0; i < text.length; i++) {
            const unit = text.charCodeAt(i);
            if (unit < 0xD800 || unit > 0xDFFF) continue;
            const next = text.charCodeAt(i + 1);
            if (unit > 0xDBFF || !(next >= 0xDC00 && next <= 0xDFFF)) return false;
            i += 1;
        }
        return true;
    };
    const units = (text) => Array.from({ length: text.length }, (_, i) => text.charCodeAt(i));

    const encode = (value) => {
        if (value === undefined || value === null) return { type: 'null' };
        switch (typeof value) {
            case 'boolean':
                return { type: 'bool', value };
            case 'number':
                if (!Number.isFinite(value)) return { type: 'string', value: String(value) };
                return Number.isSafeInteger(value)
                    ? { type: 'int64', value }
                    : { type: 'float64', value };
            case 'string':
                return { type: 'string', value: wellFormed(value) ? value : units(value) };
        }
        const id = ids.get(value);
        if (id !== undefined) return { type: 'node', value: id };
        const owner = styleOwners.get(value);
        if (owner !== undefined) return { type: 'style', value: owner };
        return { type: 'json', value: JSON.stringify(value) };
    };
    const encodeArgs = (args) => JSON.stringify(args.map(encode));

    const decode = (raw) => {
        if (raw === undefined) return undefined;
        const value = JSON.parse(raw);
        switch (value.type) {
            case 'null':
                return null;
            case 'json':
                return JSON.parse(value.value);
            case 'node':
                return wrap(value.value);
            case 'style':
                return styleFor(value.value);
            case 'string':
                return Array.isArray(value.value) ? String.fromCharCode(...value.value) : value.value;
            default:
                return value.value;
        }
    };

    const idOf = (wrapper) => {
        const id = ids.get(wrapper);
        if (id === undefined) throw new TypeError('Illegal invocation');
        return id;
    };

    const handler = {
        get(target, key, receiver) {
            if (typeof key === 'symbol' || key in target) return Reflect.get(target, key, receiver);
            return decode(host(__bridge_get, target[ID], key));
        },
        set(target, key, value, receiver) {
            if (typeof key === 'symbol') return Reflect.set(target, key, value, receiver);
            host(__bridge_set, target[ID], key, JSON.stringify(encode(value)));
            return true;
        },
        deleteProperty(target, key) {
            if (typeof key === 'symbol') return Reflect.deleteProperty(target, key);
            return host(__bridge_delete, target[ID], key);
        },
        has(target, key) {
            if (typeof key === 'symbol' || key in target) return key in target;
            return host(__bridge_get, target[ID], key) !== undefined;
        },
        ownKeys(target) {
            return host(__bridge_keys, target[ID]).concat(Reflect.ownKeys(target));
        },
        getOwnPropertyDescriptor(target, key) {
            if (typeof key === 'symbol') return Reflect.getOwnPropertyDescriptor(target, key);
            const raw = host(__bridge_get, target[ID], key);
            if (raw === undefined) return undefined;
            return { value: decode(raw), writable: true, enumerable: true, configurable: true };
        },
    };

    const createWrapper = (ctor, id) => {
        const target = Object.create(ctor.prototype);
        Object.defineProperty(target, ID, { value: id, configurable: true });
        const wrapper = new Proxy(target, handler);
        ids.set(wrapper, id);
        epoch += 1;
        if (weak) {
            cache.set(id, { ref: new WeakRef(wrapper), epoch });
            if (id !== documentId) registry.register(wrapper, { id, epoch });
        } else {
            cache.set(id, { wrapper, epoch });
        }
        return wrapper;
    };

    const wrap = (id) => {
        const entry = cache.get(id);
        const existing = entry && (entry.ref ? entry.ref.deref() : entry.wrapper);
        if (existing) return existing;
        const ctor = classes.get(host(__bridge_class_of, id)) || classes.get('Node');
        const wrapper = createWrapper(ctor, id);
        host(__bridge_adopt, id);
        return wrapper;
    };

    function CSSStyleDeclaration() {
        throw new TypeError('Illegal constructor');
    }
    g.CSSStyleDeclaration = CSSStyleDeclaration;
    const styleMethods = ['item', 'getPropertyValue', 'setProperty', 'removeProperty', 'toString'];

    // The declaration holds its element, so the element outlives every
    // reachable reference to its style.
    const createStyle = (element) => {
        const owner = idOf(element);
        const call = (op, args) => decode(host(__bridge_style, idOf(element), op, encodeArgs(args)));
        const style = new Proxy(Object.create(CSSStyleDeclaration.prototype), {
            get(target, key, receiver) {
                if (typeof key === 'symbol') return Reflect.get(target, key, receiver);
                if (styleMethods.includes(key)) return (...args) => call(key, args);
                if (key === 'length' || key === 'cssText') return call(key, []);
                if (/^[0-9]+$/.test(key)) return call('item', [Number(key)]);
                if (key in target) return Reflect.get(target, key, receiver);
                return call('getPropertyValue', [key]);
            },
            set(target, key, value, receiver) {
                if (typeof key === 'symbol') return Reflect.set(target, key, value, receiver);
                if (key === 'cssText') call('setCssText', [value]);
                else call('setProperty', [key, value]);
                return true;
            },
            deleteProperty(target, key) {
                if (typeof key !== 'symbol') call('removeProperty', [key]);
                return true;
            },
            ownKeys(target) {
                return call('keys', []).concat(Reflect.ownKeys(target));
            },
            getOwnPropertyDescriptor(target, key) {
                if (typeof key === 'symbol') return Reflect.getOwnPropertyDescriptor(target, key);
                const value = call('getPropertyValue', [key]);
                if (value === '') return undefined;
                return { value, writable: true, enumerable: true, configurable: true };
            },
        });
        styleOwners.set(style, owner);
        return style;
    };

    const styleFor = (owner) => {
        const element = wrap(owner);
        let style = element[STYLE];
        if (!style) {
            style = createStyle(element);
            Object.defineProperty(element, STYLE, { value: style, configurable: true });
        }
        return style;
    };

    g.__bridge_define_class = (name, parent, constructible, methods) => {
        const base = parent ? classes.get(parent) : undefined;
        const ctor = function (...args) {
            if (!new.target) {
                throw new TypeError(`Failed to construct '${name}': Please use the 'new' operator`);
            }
            if (!constructible) throw new TypeError('Illegal constructor');
            const id = host(__bridge_construct, name, encodeArgs(args));
            return createWrapper(classes.get(name), id);
        };
        Object.defineProperty(ctor, 'name', { value: name });
        if (base) {
            Object.setPrototypeOf(ctor.prototype, base.prototype);
            Object.setPrototypeOf(ctor, base);
        }
        for (const method of methods) {
            ctor.prototype[method] = function (...args) {
                return decode(host(__bridge_call, idOf(this), method, encodeArgs(args)));
            };
        }
        classes.set(name, ctor);
        g[name] = ctor;
    };

    g.__bridge_install_document = (id) => {
        documentId = id;
        const Document = classes.get('Document');
        Document.prototype.createElement = (tag) => new (classes.get('Element'))(tag);
        Document.prototype.createTextNode = (data) => new (classes.get('TextNode'))(data);
        Document.prototype.createComment = (data) => new (classes.get('CommentNode'))(data);
        const document = createWrapper(Document, id);
        Object.defineProperty(g, 'document', { value: document, configurable: true });
    };

    g.bridge = {
        addModuleListener(listener) {
            if (typeof listener !== 'function') throw new TypeError('listener must be a function');
            listeners.push(listener);
        },
        invokeModule(module, method, params) {
            return decode(host(__bridge_invoke_module, String(module), String(method),
                JSON.stringify(encode(params))));
        },
    };

    g.__bridge_dispatch_module_event = (module, type, eventId, extra) => {
        const event = { type, target: eventId === undefined || eventId === null ? null : wrap(eventId) };
        const detail = decode(extra);
        for (const listener of listeners) {
            const result = listener(module, event, detail);
            if (result !== undefined) return JSON.stringify(encode(result));
        }
        return undefined;
    };
})();
"#;

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::binding::install;
    use crate::foundation::CommandType;

    fn engine_with(callbacks: HostCallbacks) -> (QuickJsEngine, Rc<RefCell<DomState>>) {
        let mut engine = QuickJsEngine::new(SurfaceId(1), Arc::new(callbacks), 100).unwrap();
        let state = DomState::new(SurfaceId(1), engine.new_heap(), 16).unwrap();
        let state = Rc::new(RefCell::new(state));
        install(&mut engine, &state).unwrap();
        (engine, state)
    }

    fn engine() -> (QuickJsEngine, Rc<RefCell<DomState>>) {
        engine_with(HostCallbacks::new())
    }

    fn kinds(state: &Rc<RefCell<DomState>>) -> Vec<CommandType> {
        state.borrow().commands().data().iter().map(|c| c.kind).collect()
    }

    #[test]
    fn text_data_assignment_is_mirrored() {
        let (mut engine, state) = engine();
        let data: String = engine
            .eval_with("const t = new TextNode('a'); t.data = 'b'; t.data", "text.js")
            .unwrap();
        assert_eq!(data, "b");
        assert_eq!(
            kinds(&state),
            vec![
                CommandType::CreateDocument,
                CommandType::CreateTextNode,
                CommandType::SetProperty
            ]
        );
        let state = state.borrow();
        let set = &state.commands().data()[2];
        assert_eq!(set.args, vec![NativeString::from("data"), NativeString::from("b")]);
    }

    #[test]
    fn comment_length_counts_code_units() {
        let (mut engine, _state) = engine();
        let length: i32 = engine
            .eval_with("new CommentNode('\\uD83D\\uDE00abc').length", "comment.js")
            .unwrap();
        assert_eq!(length, 5);
        let name: String = engine
            .eval_with("new CommentNode('x').nodeName", "comment.js")
            .unwrap();
        assert_eq!(name, "#comment");
    }

    #[test]
    fn constructor_errors_are_type_errors() {
        let (mut engine, _state) = engine();
        let outcome: String = engine
            .eval_with(
                "try { new Element(); 'no error' } catch (e) { e instanceof TypeError ? 'type' : e.name }",
                "ctor.js",
            )
            .unwrap();
        assert_eq!(outcome, "type");
        let outcome: String = engine
            .eval_with(
                "try { new Document(); 'no error' } catch (e) { e.message }",
                "ctor.js",
            )
            .unwrap();
        assert_eq!(outcome, "Illegal constructor");
    }

    #[test]
    fn tree_and_text_content() {
        let (mut engine, state) = engine();
        let text: String = engine
            .eval_with(
                r#"
                const div = document.createElement('div');
                div.appendChild(document.createTextNode('hi'));
                div.appendChild(document.createTextNode(' there'));
                document.appendChild(div);
                div.firstChild.data + '|' + div.textContent
                "#,
                "tree.js",
            )
            .unwrap();
        assert_eq!(text, "hi|hi there");
        assert!(kinds(&state).contains(&CommandType::InsertAdjacentNode));
    }

    #[test]
    fn style_remove_property_is_not_repeated() {
        let (mut engine, state) = engine();
        let result: String = engine
            .eval_with(
                r#"
                const el = document.createElement('div');
                el.style.setProperty('color', 'red');
                const first = el.style.removeProperty('color');
                const second = el.style.removeProperty('color');
                JSON.stringify([first, second, el.style.getPropertyValue('color'), el.style.length])
                "#,
                "style.js",
            )
            .unwrap();
        assert_eq!(result, r#"["red","","",0]"#);
        let set_styles = kinds(&state)
            .into_iter()
            .filter(|kind| *kind == CommandType::SetStyle)
            .count();
        assert_eq!(set_styles, 2);
    }

    #[test]
    fn held_style_keeps_its_element_alive() {
        let (mut engine, state) = engine();
        engine
            .eval_with::<()>(
                "globalThis.kept = (() => document.createElement('div').style)();",
                "style.js",
            )
            .unwrap();
        engine.runtime.run_gc();
        engine.execute_pending_jobs();
        assert!(!kinds(&state).contains(&CommandType::DisposeEventTarget));

        let color: String = engine
            .eval_with(
                "kept.setProperty('color', 'red'); kept.getPropertyValue('color')",
                "style.js",
            )
            .unwrap();
        assert_eq!(color, "red");
    }

    #[test]
    fn unpaired_surrogates_cross_intact() {
        let (mut engine, state) = engine();
        let length: i32 = engine
            .eval_with("new CommentNode('\\uD800x').length", "lone.js")
            .unwrap();
        assert_eq!(length, 2);

        let same: bool = engine
            .eval_with(
                "const t = new TextNode('a'); t.data = '\\uDC00'; t.data === '\\uDC00'",
                "lone.js",
            )
            .unwrap();
        assert!(same);
        let last = state.borrow().commands().data().last().cloned().unwrap();
        assert_eq!(last.args[1].as_utf16(), &[0xDC00u16][..]);

        let mut source: Vec<u16> = "globalThis.raw = '".encode_utf16().collect();
        source.push(0xD83D);
        source.extend("';".encode_utf16());
        engine
            .evaluate_script(&NativeString::from(source), "raw.js", 1)
            .unwrap();
        let raw: bool = engine
            .eval_with("raw.length === 1 && raw.charCodeAt(0) === 0xD83D", "lone.js")
            .unwrap();
        assert!(raw);
    }

    #[test]
    fn enumerates_declared_names() {
        let (mut engine, _state) = engine();
        let found: bool = engine
            .eval_with(
                "const n = new TextNode('x'); n.extra = 1; const k = Object.keys(n); k.includes('data') && k.includes('nodeType') && k.includes('extra') && 'data' in n",
                "keys.js",
            )
            .unwrap();
        assert!(found);
    }

    #[test]
    fn exceptions_are_captured() {
        let (mut engine, _state) = engine();
        let err = engine
            .evaluate_script(&NativeString::from("throw new Error('boom')"), "boom.js", 1)
            .unwrap_err();
        match err {
            ScriptError::Exception { message } => assert!(message.contains("boom"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn module_events_reach_listeners() {
        let (mut engine, _state) = engine();
        engine
            .evaluate_script(
                &NativeString::from(
                    "bridge.addModuleListener((module, event, detail) => module === 'm' && event.type === 'tick' ? detail.n + 1 : undefined)",
                ),
                "listener.js",
                1,
            )
            .unwrap();
        let result = engine
            .invoke_module_event(
                &NativeString::from("m"),
                "tick",
                None,
                &NativeValue::Json(r#"{"n":41}"#.to_string()),
            )
            .unwrap();
        assert_eq!(result, NativeValue::Int64(42));
        let unhandled = engine
            .invoke_module_event(&NativeString::from("other"), "tick", None, &NativeValue::Null)
            .unwrap();
        assert_eq!(unhandled, NativeValue::Null);
    }

    #[test]
    fn console_and_module_calls_reach_the_host() {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&logs);
        let callbacks = HostCallbacks::new()
            .on_js_log(move |_, level, message| sink.lock().unwrap().push((level, message.to_string())))
            .on_invoke_module(|_, module, method, params| {
                NativeValue::string(format!("{module}.{method}({})", params.to_native_string()))
            });
        let (mut engine, _state) = engine_with(callbacks);
        let reply: String = engine
            .eval_with("console.warn('careful', 1); bridge.invokeModule('clip', 'read', 'x')", "host.js")
            .unwrap();
        assert_eq!(reply, "clip.read(x)");
        assert_eq!(
            logs.lock().unwrap().as_slice(),
            &[(tracing::Level::WARN, "careful 1".to_string())]
        );
    }
}
