//! SimConnect implementation of [`SimBridge`].
//!
//! `SimConnect.dll` ships with the simulator SDK and is loaded at runtime, so the
//! binary builds without the SDK installed. Variables are requested on demand
//! (period "once") and the dispatch queue is pumped until the answer arrives or
//! a short timeout expires, in which case the caller sees `None`.

use crate::bridge::{BridgeConnector, SimBridge};
#[cfg(not(target_os = "windows"))]
use crate::error::Error;
use crate::error::Result;

/// Client name announced to the simulator
pub const CLIENT_NAME: &str = "simrate";

/// Opens SimConnect sessions for the supervisor.
#[derive(Debug, Clone)]
pub struct SimConnectConnector {
    client_name: String,
}

impl SimConnectConnector {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

impl Default for SimConnectConnector {
    fn default() -> Self {
        Self::new(CLIENT_NAME)
    }
}

impl BridgeConnector for SimConnectConnector {
    type Bridge = SimConnectBridge;

    fn connect(&mut self) -> Result<SimConnectBridge> {
        SimConnectBridge::open(&self.client_name)
    }
}

#[cfg(target_os = "windows")]
mod ffi {
    //! Raw SimConnect ABI (`SimConnect.h`, packed to 1 byte).

    use std::ffi::c_char;

    pub type Handle = isize;

    pub type OpenFn =
        unsafe extern "system" fn(*mut Handle, *const c_char, isize, u32, isize, u32) -> i32;
    pub type CloseFn = unsafe extern "system" fn(Handle) -> i32;
    pub type MapClientEventFn = unsafe extern "system" fn(Handle, u32, *const c_char) -> i32;
    pub type TransmitClientEventFn =
        unsafe extern "system" fn(Handle, u32, u32, u32, u32, u32) -> i32;
    pub type AddToDataDefinitionFn =
        unsafe extern "system" fn(Handle, u32, *const c_char, *const c_char, u32, f32, u32) -> i32;
    pub type RequestDataOnSimObjectFn =
        unsafe extern "system" fn(Handle, u32, u32, u32, u32, u32, u32, u32, u32) -> i32;
    pub type SubscribeToSystemEventFn =
        unsafe extern "system" fn(Handle, u32, *const c_char) -> i32;
    pub type GetNextDispatchFn = unsafe extern "system" fn(Handle, *mut *mut Recv, *mut u32) -> i32;

    pub const RECV_ID_EXCEPTION: u32 = 1;
    pub const RECV_ID_OPEN: u32 = 2;
    pub const RECV_ID_QUIT: u32 = 3;
    pub const RECV_ID_EVENT: u32 = 4;
    pub const RECV_ID_SIMOBJECT_DATA: u32 = 8;

    pub const OBJECT_ID_USER: u32 = 0;
    pub const DATATYPE_FLOAT64: u32 = 4;
    pub const PERIOD_ONCE: u32 = 1;
    pub const UNUSED: u32 = u32::MAX;
    pub const GROUP_PRIORITY_HIGHEST: u32 = 1;
    pub const EVENT_FLAG_GROUPID_IS_PRIORITY: u32 = 0x10;

    /// Byte offset of `dwData` inside `SIMCONNECT_RECV_SIMOBJECT_DATA`
    pub const SIMOBJECT_DATA_OFFSET: usize = 40;

    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct Recv {
        pub size: u32,
        pub version: u32,
        pub id: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct RecvEvent {
        pub header: Recv,
        pub group_id: u32,
        pub event_id: u32,
        pub data: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct RecvSimObjectData {
        pub header: Recv,
        pub request_id: u32,
        pub object_id: u32,
        pub define_id: u32,
        pub flags: u32,
        pub entry_number: u32,
        pub out_of: u32,
        pub define_count: u32,
    }
}

#[cfg(target_os = "windows")]
mod imp {
    use std::collections::HashMap;
    use std::ffi::CString;
    use std::thread;
    use std::time::{Duration, Instant};

    use tracing::{debug, warn};
    use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
    use windows::core::{PCSTR, w};

    use super::ffi::{self, Handle};
    use crate::bridge::{SimBridge, events, variables};
    use crate::error::{Error, Result};

    /// How long a variable request waits for the simulator's answer
    const VARIABLE_TIMEOUT: Duration = Duration::from_millis(100);
    const DISPATCH_POLL: Duration = Duration::from_millis(5);

    /// Client event id reserved for the "Pause" system event subscription
    const PAUSE_SYSTEM_EVENT_ID: u32 = 0;

    struct Api {
        open: ffi::OpenFn,
        close: ffi::CloseFn,
        map_client_event: ffi::MapClientEventFn,
        transmit_client_event: ffi::TransmitClientEventFn,
        add_to_data_definition: ffi::AddToDataDefinitionFn,
        request_data_on_sim_object: ffi::RequestDataOnSimObjectFn,
        subscribe_to_system_event: ffi::SubscribeToSystemEventFn,
        get_next_dispatch: ffi::GetNextDispatchFn,
    }

    macro_rules! load_symbol {
        ($module:expr, $name:literal, $ty:ty) => {{
            // SAFETY: the symbol name is a NUL-terminated literal and the function
            // pointer type matches the SimConnect.h prototype.
            let symbol = unsafe { GetProcAddress($module, PCSTR(concat!($name, "\0").as_ptr())) }
                .ok_or_else(|| Error::BridgeUnavailable(format!("{} not exported", $name)))?;
            unsafe { std::mem::transmute::<unsafe extern "system" fn() -> isize, $ty>(symbol) }
        }};
    }

    impl Api {
        fn load() -> Result<Self> {
            // SAFETY: loading a DLL runs its initialisation; SimConnect.dll is the
            // simulator's own client library.
            let module = unsafe { LoadLibraryW(w!("SimConnect.dll")) }
                .map_err(|e| Error::BridgeUnavailable(format!("SimConnect.dll: {e}")))?;

            Ok(Self {
                open: load_symbol!(module, "SimConnect_Open", ffi::OpenFn),
                close: load_symbol!(module, "SimConnect_Close", ffi::CloseFn),
                map_client_event: load_symbol!(
                    module,
                    "SimConnect_MapClientEventToSimEvent",
                    ffi::MapClientEventFn
                ),
                transmit_client_event: load_symbol!(
                    module,
                    "SimConnect_TransmitClientEvent",
                    ffi::TransmitClientEventFn
                ),
                add_to_data_definition: load_symbol!(
                    module,
                    "SimConnect_AddToDataDefinition",
                    ffi::AddToDataDefinitionFn
                ),
                request_data_on_sim_object: load_symbol!(
                    module,
                    "SimConnect_RequestDataOnSimObject",
                    ffi::RequestDataOnSimObjectFn
                ),
                subscribe_to_system_event: load_symbol!(
                    module,
                    "SimConnect_SubscribeToSystemEvent",
                    ffi::SubscribeToSystemEventFn
                ),
                get_next_dispatch: load_symbol!(
                    module,
                    "SimConnect_GetNextDispatch",
                    ffi::GetNextDispatchFn
                ),
            })
        }
    }

    fn c_string(value: &str) -> Result<CString> {
        CString::new(value).map_err(|e| Error::BridgeUnavailable(format!("invalid name {value:?}: {e}")))
    }

    pub struct SimConnectBridge {
        api: Api,
        handle: Handle,
        ok: bool,
        paused: bool,
        client_events: HashMap<String, u32>,
        definitions: HashMap<String, u32>,
        values: HashMap<u32, f64>,
        next_event_id: u32,
        next_definition_id: u32,
    }

    // SAFETY: the SimConnect handle is only used through `&mut self`, so at most one
    // thread touches it at a time.
    unsafe impl Send for SimConnectBridge {}

    impl SimConnectBridge {
        pub fn open(client_name: &str) -> Result<Self> {
            let api = Api::load()?;
            let name = c_string(client_name)?;
            let mut handle: Handle = 0;

            // SAFETY: out-parameter and name pointer are valid for the call.
            let hr = unsafe { (api.open)(&mut handle, name.as_ptr(), 0, 0, 0, 0) };
            if hr < 0 || handle == 0 {
                return Err(Error::BridgeUnavailable(format!(
                    "SimConnect_Open failed (hr={hr:#x})"
                )));
            }

            let mut bridge = Self {
                api,
                handle,
                ok: false,
                paused: false,
                client_events: HashMap::new(),
                definitions: HashMap::new(),
                values: HashMap::new(),
                next_event_id: PAUSE_SYSTEM_EVENT_ID + 1,
                next_definition_id: 0,
            };

            let pause = c_string("Pause")?;
            // SAFETY: handle is open; name outlives the call.
            let hr = unsafe {
                (bridge.api.subscribe_to_system_event)(handle, PAUSE_SYSTEM_EVENT_ID, pause.as_ptr())
            };
            if hr < 0 {
                warn!("Failed to subscribe to pause events (hr={:#x})", hr);
            }

            bridge.pump();
            Ok(bridge)
        }

        /// Drain the dispatch queue, updating connection, pause and variable state.
        fn pump(&mut self) {
            loop {
                let mut data: *mut ffi::Recv = std::ptr::null_mut();
                let mut size = 0u32;
                // SAFETY: out-parameters are valid; SimConnect owns the returned buffer
                // until the next dispatch call, and we copy everything out before that.
                let hr = unsafe { (self.api.get_next_dispatch)(self.handle, &mut data, &mut size) };
                if hr < 0 || data.is_null() {
                    break;
                }

                // SAFETY: every message starts with a SIMCONNECT_RECV header.
                let header = unsafe { std::ptr::read_unaligned(data) };
                match header.id {
                    ffi::RECV_ID_OPEN => {
                        debug!("SimConnect session open");
                        self.ok = true;
                    }
                    ffi::RECV_ID_QUIT => {
                        debug!("Simulator closed the SimConnect session");
                        self.ok = false;
                    }
                    ffi::RECV_ID_EVENT => {
                        // SAFETY: id identifies the message as SIMCONNECT_RECV_EVENT.
                        let event = unsafe { std::ptr::read_unaligned(data.cast::<ffi::RecvEvent>()) };
                        if event.event_id == PAUSE_SYSTEM_EVENT_ID {
                            self.paused = event.data != 0;
                        }
                    }
                    ffi::RECV_ID_SIMOBJECT_DATA if size as usize >= ffi::SIMOBJECT_DATA_OFFSET + 8 => {
                        // SAFETY: id and size identify a SIMOBJECT_DATA message carrying
                        // at least one FLOAT64 datum.
                        let (message, value) = unsafe {
                            let message = std::ptr::read_unaligned(data.cast::<ffi::RecvSimObjectData>());
                            let value_ptr = data.cast::<u8>().add(ffi::SIMOBJECT_DATA_OFFSET);
                            (message, std::ptr::read_unaligned(value_ptr.cast::<f64>()))
                        };
                        self.values.insert(message.define_id, value);
                    }
                    ffi::RECV_ID_EXCEPTION => {
                        debug!("SimConnect exception message received");
                    }
                    _ => {}
                }
            }
        }

        fn client_event_id(&mut self, name: &str) -> Result<u32> {
            if let Some(&id) = self.client_events.get(name) {
                return Ok(id);
            }

            let id = self.next_event_id;
            let event_name = c_string(name)?;
            // SAFETY: handle is open; name outlives the call.
            let hr = unsafe { (self.api.map_client_event)(self.handle, id, event_name.as_ptr()) };
            if hr < 0 {
                return Err(Error::EventFailed {
                    event: name.to_string(),
                    message: format!("map failed (hr={hr:#x})"),
                });
            }

            self.next_event_id += 1;
            self.client_events.insert(name.to_string(), id);
            Ok(id)
        }

        fn definition_id(&mut self, name: &str) -> Option<u32> {
            if let Some(&id) = self.definitions.get(name) {
                return Some(id);
            }

            let id = self.next_definition_id;
            let datum = c_string(name).ok()?;
            let units = c_string(variables::units(name)).ok()?;
            // SAFETY: handle is open; both strings outlive the call.
            let hr = unsafe {
                (self.api.add_to_data_definition)(
                    self.handle,
                    id,
                    datum.as_ptr(),
                    units.as_ptr(),
                    ffi::DATATYPE_FLOAT64,
                    0.0,
                    ffi::UNUSED,
                )
            };
            if hr < 0 {
                debug!("AddToDataDefinition({}) failed (hr={:#x})", name, hr);
                return None;
            }

            self.next_definition_id += 1;
            self.definitions.insert(name.to_string(), id);
            Some(id)
        }
    }

    impl SimBridge for SimConnectBridge {
        fn is_ok(&mut self) -> bool {
            self.pump();
            self.ok
        }

        fn is_paused(&mut self) -> bool {
            self.pump();
            self.paused
        }

        fn set_paused(&mut self, paused: bool) -> Result<()> {
            self.trigger_event(events::PAUSE_SET, paused as u32)?;
            self.paused = paused;
            Ok(())
        }

        fn get_variable(&mut self, name: &str) -> Option<f64> {
            let id = self.definition_id(name)?;
            self.values.remove(&id);

            // SAFETY: handle is open; the definition id was registered above.
            let hr = unsafe {
                (self.api.request_data_on_sim_object)(
                    self.handle,
                    id,
                    id,
                    ffi::OBJECT_ID_USER,
                    ffi::PERIOD_ONCE,
                    0,
                    0,
                    0,
                    0,
                )
            };
            if hr < 0 {
                return None;
            }

            let deadline = Instant::now() + VARIABLE_TIMEOUT;
            loop {
                self.pump();
                if let Some(value) = self.values.remove(&id) {
                    return Some(value);
                }
                if Instant::now() >= deadline {
                    return None;
                }
                thread::sleep(DISPATCH_POLL);
            }
        }

        fn trigger_event(&mut self, name: &str, param: u32) -> Result<()> {
            let id = self.client_event_id(name)?;
            // SAFETY: handle is open and the event id is mapped.
            let hr = unsafe {
                (self.api.transmit_client_event)(
                    self.handle,
                    ffi::OBJECT_ID_USER,
                    id,
                    param,
                    ffi::GROUP_PRIORITY_HIGHEST,
                    ffi::EVENT_FLAG_GROUPID_IS_PRIORITY,
                )
            };
            if hr < 0 {
                return Err(Error::EventFailed {
                    event: name.to_string(),
                    message: format!("transmit failed (hr={hr:#x})"),
                });
            }
            Ok(())
        }
    }

    impl Drop for SimConnectBridge {
        fn drop(&mut self) {
            // SAFETY: the handle was opened by SimConnect_Open and is closed once.
            unsafe {
                (self.api.close)(self.handle);
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use imp::SimConnectBridge;

/// Placeholder on platforms without SimConnect; it can never be opened.
#[cfg(not(target_os = "windows"))]
pub struct SimConnectBridge {
    _private: (),
}

#[cfg(not(target_os = "windows"))]
impl SimConnectBridge {
    pub fn open(_client_name: &str) -> Result<Self> {
        Err(Error::BridgeUnavailable(
            "SimConnect is only available on Windows".to_string(),
        ))
    }
}

#[cfg(not(target_os = "windows"))]
impl SimBridge for SimConnectBridge {
    fn is_ok(&mut self) -> bool {
        false
    }

    fn is_paused(&mut self) -> bool {
        false
    }

    fn set_paused(&mut self, _paused: bool) -> Result<()> {
        Err(Error::BridgeUnavailable("unsupported platform".to_string()))
    }

    fn get_variable(&mut self, _name: &str) -> Option<f64> {
        None
    }

    fn trigger_event(&mut self, name: &str, _param: u32) -> Result<()> {
        Err(Error::EventFailed {
            event: name.to_string(),
            message: "unsupported platform".to_string(),
        })
    }
}
