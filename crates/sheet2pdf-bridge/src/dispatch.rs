//! Late-bound COM automation over IDispatch.
//!
//! Excel's object model is reached the way VBScript reaches it: look up a
//! member's DISPID by name, then `Invoke` it as a property get, property put
//! or method call. Everything here is a thin, string-error wrapper around
//! those two calls plus the VARIANT plumbing they need.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{Interface, BSTR, GUID, HSTRING, IUnknown, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
            },
            Ole::{GetActiveObject, DISPID_PROPERTYPUT},
            Variant::{
                VARIANT, VT_BOOL, VT_BSTR, VT_DATE, VT_DISPATCH, VT_EMPTY, VT_ERROR, VT_I2, VT_I4,
                VT_NULL, VT_R4, VT_R8,
            },
        },
    },
};

// -- VARIANT construction --
// The VARIANT struct wraps inner unions in ManuallyDrop, so fields are set
// with ptr::write rather than through DerefMut.

pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

// -- VARIANT inspection --

pub fn variant_vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

pub fn variant_get_bool(v: &VARIANT) -> Option<bool> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BOOL {
            Some(v.Anonymous.Anonymous.Anonymous.boolVal.0 != 0)
        } else {
            None
        }
    }
}

/// Numeric payload of a VARIANT. Dates come back as their OLE serial number.
pub fn variant_get_f64(v: &VARIANT) -> Option<f64> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_R8 {
            Some(anon.dblVal)
        } else if vt == VT_DATE {
            Some(anon.date)
        } else if vt == VT_R4 {
            Some(anon.fltVal as f64)
        } else if vt == VT_I4 {
            Some(anon.lVal as f64)
        } else if vt == VT_I2 {
            Some(anon.iVal as f64)
        } else {
            None
        }
    }
}

pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            Some(v.Anonymous.Anonymous.Anonymous.bstrVal.to_string())
        } else {
            None
        }
    }
}

/// The SCODE of a VT_ERROR variant.
pub fn variant_get_scode(v: &VARIANT) -> Option<i32> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_ERROR {
            Some(v.Anonymous.Anonymous.Anonymous.scode)
        } else {
            None
        }
    }
}

pub fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

pub fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

// -- DispatchObject --

/// A COM object reached through IDispatch.
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Start a new out-of-process server for a ProgID (e.g. "Excel.Application").
    pub fn create(progid: &str) -> Result<Self, String> {
        unsafe {
            let clsid = clsid_for(progid)?;
            let disp: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance failed for '{progid}': {e}"))?;
            Ok(Self { inner: disp })
        }
    }

    /// Attach to an instance registered in the Running Object Table.
    ///
    /// Returns `Ok(None)` when no instance is running.
    pub fn active(progid: &str) -> Result<Option<Self>, String> {
        unsafe {
            let clsid = clsid_for(progid)?;
            let mut unknown: Option<IUnknown> = None;
            if GetActiveObject(&clsid, None, &mut unknown).is_err() {
                return Ok(None);
            }
            match unknown {
                Some(unknown) => {
                    let disp: IDispatch = unknown
                        .cast()
                        .map_err(|e| format!("running '{progid}' has no IDispatch: {e}"))?;
                    Ok(Some(Self { inner: disp }))
                }
                None => Ok(None),
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    /// Indexed property get, e.g. `Sheets("Summary")` or `Cells(1, 1)`.
    pub fn get_with(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, args)
    }

    pub fn put(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value])?;
        Ok(())
    }

    pub fn call(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    pub fn get_object(&self, name: &str) -> Result<DispatchObject, String> {
        extract_dispatch(&self.get(name)?, name)
    }

    pub fn get_object_with(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        extract_dispatch(&self.get_with(name, args)?, name)
    }

    pub fn call_object(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        extract_dispatch(&self.call(name, args)?, name)
    }

    /// Read an integer-valued property such as `Count`.
    pub fn get_u32(&self, name: &str) -> Result<u32, String> {
        let value = self.get(name)?;
        variant_get_f64(&value)
            .map(|n| n as u32)
            .ok_or_else(|| format!("'{name}' is not numeric (VT={})", variant_vt(&value)))
    }

    pub fn get_string(&self, name: &str) -> Result<String, String> {
        let value = self.get(name)?;
        variant_get_string(&value)
            .ok_or_else(|| format!("'{name}' is not a string (VT={})", variant_vt(&value)))
    }

    fn dispid(&self, name: &str) -> Result<i32, String> {
        unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let names = [PCWSTR(wide.as_ptr())];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
            Ok(dispid)
        }
    }

    /// Single entry point for every Invoke. `args` are in natural order;
    /// DISPPARAMS wants them reversed.
    fn invoke(&self, name: &str, flags: DISPATCH_FLAGS, args: &[VARIANT]) -> Result<VARIANT, String> {
        let dispid = self.dispid(name)?;
        let is_put = flags == DISPATCH_PROPERTYPUT;
        unsafe {
            let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
            let mut named_args = [DISPID_PROPERTYPUT];
            let params = DISPPARAMS {
                rgvarg: if reversed.is_empty() {
                    ptr::null_mut()
                } else {
                    reversed.as_mut_ptr()
                },
                rgdispidNamedArgs: if is_put {
                    named_args.as_mut_ptr()
                } else {
                    ptr::null_mut()
                },
                cArgs: reversed.len() as u32,
                cNamedArgs: if is_put { 1 } else { 0 },
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    if is_put { None } else { Some(&mut result) },
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(result)
        }
    }
}

unsafe fn clsid_for(progid: &str) -> Result<GUID, String> {
    let hstr = HSTRING::from(progid);
    CLSIDFromProgID(&hstr).map_err(|e| format!("CLSIDFromProgID('{progid}') failed: {e}"))
}

fn extract_dispatch(variant: &VARIANT, context: &str) -> Result<DispatchObject, String> {
    if let Some(disp) = variant_get_dispatch(variant) {
        Ok(DispatchObject { inner: disp })
    } else if variant_is_empty(variant) {
        Err(format!("'{context}' returned empty/null"))
    } else {
        let vt = variant_vt(variant);
        Err(format!(
            "'{context}' returned non-object VARIANT (VT={vt}), expected VT_DISPATCH"
        ))
    }
}

/// Include EXCEPINFO details when the server raised an exception.
fn format_invoke_error(err: windows::core::Error, except: &EXCEPINFO, member_name: &str) -> String {
    if err.code() == DISP_E_EXCEPTION {
        let desc = if except.bstrDescription.is_empty() {
            String::from("(no description)")
        } else {
            except.bstrDescription.to_string()
        };
        let source = if except.bstrSource.is_empty() {
            String::from("(no source)")
        } else {
            except.bstrSource.to_string()
        };
        format!("COM exception in '{member_name}': {desc} (source: {source})")
    } else {
        format!("Invoke('{member_name}') failed: {err}")
    }
}
