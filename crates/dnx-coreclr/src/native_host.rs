//! `ICLRRuntimeHost2` over its raw COM vtable.
//!
//! Strings crossing this boundary are NUL-terminated UTF-16 (`WCHAR`, which is 16-bit on
//! every CoreCLR platform). Nothing outside this module sees a raw interface pointer.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::domain::PropertyBag;
use crate::error::HResult;
use crate::host::{DomainFlags, DomainId, EntryPoint, EntryPointTarget, RuntimeHost, StartupFlags};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// {712AB73F-2C22-4807-AD7E-F501D7B72C2D}
pub const IID_ICLR_RUNTIME_HOST2: Guid = Guid {
    data1: 0x712A_B73F,
    data2: 0x2C22,
    data3: 0x4807,
    data4: [0xAD, 0x7E, 0xF5, 0x01, 0xD7, 0xB7, 0x2C, 0x2D],
};

/// `GetCLRRuntimeHost(REFIID, IUnknown**)`
pub type GetClrRuntimeHostFn =
    unsafe extern "system" fn(riid: *const Guid, host: *mut *mut c_void) -> i32;

/// Managed entry point signature: `int (int argc, const WCHAR** argv)`.
pub type HostMainFn = unsafe extern "system" fn(argc: i32, argv: *const *const u16) -> i32;

type Wstr = *const u16;

#[repr(C)]
struct RawHost {
    vtbl: *const HostVtbl,
}

// Slot order is the ABI: IUnknown, ICLRRuntimeHost, then ICLRRuntimeHost2.
#[repr(C)]
#[allow(dead_code)]
struct HostVtbl {
    query_interface:
        unsafe extern "system" fn(*mut RawHost, *const Guid, *mut *mut c_void) -> i32,
    add_ref: unsafe extern "system" fn(*mut RawHost) -> u32,
    release: unsafe extern "system" fn(*mut RawHost) -> u32,

    start: unsafe extern "system" fn(*mut RawHost) -> i32,
    stop: unsafe extern "system" fn(*mut RawHost) -> i32,
    set_host_control: unsafe extern "system" fn(*mut RawHost, *mut c_void) -> i32,
    get_clr_control: unsafe extern "system" fn(*mut RawHost, *mut *mut c_void) -> i32,
    unload_app_domain: unsafe extern "system" fn(*mut RawHost, u32, i32) -> i32,
    execute_in_app_domain:
        unsafe extern "system" fn(*mut RawHost, u32, *mut c_void, *mut c_void) -> i32,
    get_current_app_domain_id: unsafe extern "system" fn(*mut RawHost, *mut u32) -> i32,
    execute_application:
        unsafe extern "system" fn(*mut RawHost, Wstr, u32, *const Wstr, *mut i32) -> i32,
    execute_in_default_app_domain:
        unsafe extern "system" fn(*mut RawHost, Wstr, Wstr, Wstr, Wstr, *mut u32) -> i32,

    create_app_domain_with_manager: unsafe extern "system" fn(
        *mut RawHost,
        Wstr,
        u32,
        Wstr,
        Wstr,
        i32,
        *const Wstr,
        *const Wstr,
        *mut u32,
    ) -> i32,
    create_delegate:
        unsafe extern "system" fn(*mut RawHost, u32, Wstr, Wstr, Wstr, *mut isize) -> i32,
    authenticate: unsafe extern "system" fn(*mut RawHost, u64) -> i32,
    register_mac_eh_port: unsafe extern "system" fn(*mut RawHost) -> i32,
    set_startup_flags: unsafe extern "system" fn(*mut RawHost, u32) -> i32,
    dll_get_activation_factory:
        unsafe extern "system" fn(*mut RawHost, u32, Wstr, *mut *mut c_void) -> i32,
    execute_assembly:
        unsafe extern "system" fn(*mut RawHost, u32, Wstr, i32, *const Wstr, *mut u32) -> i32,
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Owned reference to the runtime's hosting interface. Released on drop.
pub struct ClrRuntimeHost {
    raw: NonNull<RawHost>,
}

impl ClrRuntimeHost {
    /// Call the factory export for `IID_ICLRRuntimeHost2`.
    ///
    /// # Safety
    /// `factory` must be the `GetCLRRuntimeHost` export of a loaded CoreCLR that stays
    /// loaded for the lifetime of the returned value.
    pub unsafe fn from_factory(factory: GetClrRuntimeHostFn) -> Result<Self, HResult> {
        let mut out: *mut c_void = std::ptr::null_mut();
        HResult(factory(&IID_ICLR_RUNTIME_HOST2, &mut out)).ok()?;
        NonNull::new(out as *mut RawHost)
            .map(|raw| Self { raw })
            .ok_or(HResult::E_FAIL)
    }

    fn vtbl(&self) -> &HostVtbl {
        unsafe { &*(*self.raw.as_ptr()).vtbl }
    }

    fn this(&self) -> *mut RawHost {
        self.raw.as_ptr()
    }
}

impl Drop for ClrRuntimeHost {
    fn drop(&mut self) {
        unsafe { (self.vtbl().release)(self.this()) };
    }
}

impl RuntimeHost for ClrRuntimeHost {
    type EntryPoint = NativeEntryPoint;

    fn set_startup_flags(&mut self, flags: StartupFlags) -> Result<(), HResult> {
        HResult(unsafe { (self.vtbl().set_startup_flags)(self.this(), flags.0) }).ok()
    }

    fn authenticate(&mut self, key: u64) -> Result<(), HResult> {
        HResult(unsafe { (self.vtbl().authenticate)(self.this(), key) }).ok()
    }

    fn start(&mut self) -> Result<(), HResult> {
        HResult(unsafe { (self.vtbl().start)(self.this()) }).ok()
    }

    fn create_domain(
        &mut self,
        friendly_name: &str,
        flags: DomainFlags,
        properties: &PropertyBag,
    ) -> Result<DomainId, HResult> {
        let name = wide(friendly_name);
        let keys: Vec<Vec<u16>> = properties.keys().map(wide).collect();
        let values: Vec<Vec<u16>> = properties.values().map(wide).collect();
        let key_ptrs: Vec<Wstr> = keys.iter().map(|k| k.as_ptr()).collect();
        let value_ptrs: Vec<Wstr> = values.iter().map(|v| v.as_ptr()).collect();

        let mut id = 0u32;
        let hr = unsafe {
            (self.vtbl().create_app_domain_with_manager)(
                self.this(),
                name.as_ptr(),
                flags.0,
                std::ptr::null(),
                std::ptr::null(),
                properties.len() as i32,
                key_ptrs.as_ptr(),
                value_ptrs.as_ptr(),
                &mut id,
            )
        };
        HResult(hr).ok()?;
        Ok(DomainId(id))
    }

    fn create_entry_point(
        &mut self,
        domain: DomainId,
        target: &EntryPointTarget,
    ) -> Result<NativeEntryPoint, HResult> {
        let assembly = wide(target.assembly);
        let type_name = wide(target.type_name);
        let method = wide(target.method);
        let mut fn_ptr: isize = 0;
        let hr = unsafe {
            (self.vtbl().create_delegate)(
                self.this(),
                domain.0,
                assembly.as_ptr(),
                type_name.as_ptr(),
                method.as_ptr(),
                &mut fn_ptr,
            )
        };
        HResult(hr).ok()?;
        if fn_ptr == 0 {
            return Err(HResult::E_FAIL);
        }
        let main: HostMainFn = unsafe { std::mem::transmute(fn_ptr) };
        Ok(NativeEntryPoint { main })
    }

    fn unload_domain(&mut self, domain: DomainId, wait_until_done: bool) -> Result<(), HResult> {
        HResult(unsafe {
            (self.vtbl().unload_app_domain)(self.this(), domain.0, i32::from(wait_until_done))
        })
        .ok()
    }

    fn stop(&mut self) -> Result<(), HResult> {
        HResult(unsafe { (self.vtbl().stop)(self.this()) }).ok()
    }
}

/// Delegate returned by `CreateDelegate`.
#[derive(Clone, Copy)]
pub struct NativeEntryPoint {
    main: HostMainFn,
}

impl EntryPoint for NativeEntryPoint {
    fn invoke(&self, argv: &[String]) -> i32 {
        let args: Vec<Vec<u16>> = argv.iter().map(|a| wide(a)).collect();
        let ptrs: Vec<*const u16> = args.iter().map(|a| a.as_ptr()).collect();
        unsafe { (self.main)(ptrs.len() as i32, ptrs.as_ptr()) }
    }
}
