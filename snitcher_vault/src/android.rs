//! Snitcher Vault - Android JNI Bindings
//!
//! Exposes the Snitcher core to Kotlin/Java via JNI. The biometric prompt
//! runs on the Java side; its success callback calls `onAuthenticated`
//! before `completeLogin`.

#![cfg(feature = "android")]

use std::io::Cursor;
use std::path::PathBuf;

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::{jboolean, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use parking_lot::{const_mutex, Mutex};

use crate::{LoginOutcome, Snitcher, SnitcherConfig, VaultError};

// Global instance (singleton for Android)
static APP: Mutex<Option<Snitcher>> = const_mutex(None);

/// `completeLogin` result codes
pub mod login_codes {
    pub const SIGNED_UP: i32 = 1;
    pub const LOGGED_IN: i32 = 2;
    pub const NOT_OPEN: i32 = -1;
    pub const INVALID_EMAIL: i32 = -2;
    pub const AUTHENTICATION_REQUIRED: i32 = -3;
    pub const REJECTED: i32 = -4;
    pub const FAILED: i32 = -5;
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    env.get_string(value).ok().map(Into::into)
}

/// Open the core over app-private directories
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_open(
    mut env: JNIEnv,
    _class: JClass,
    data_dir: JString,
    cache_dir: JString,
) -> jboolean {
    let (data_dir, cache_dir) = match (
        read_string(&mut env, &data_dir),
        read_string(&mut env, &cache_dir),
    ) {
        (Some(d), Some(c)) => (d, c),
        _ => return JNI_FALSE,
    };

    let config = SnitcherConfig {
        cache_dir: PathBuf::from(cache_dir),
        ..SnitcherConfig::with_data_dir(data_dir)
    };

    match Snitcher::open(config) {
        Ok(app) => {
            *APP.lock() = Some(app);
            JNI_TRUE
        }
        Err(e) => {
            log::error!("open failed: {}", e);
            JNI_FALSE
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_isSignedUp(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    let guard = APP.lock();
    to_jboolean(guard.as_ref().map_or(false, |app| app.is_signed_up()))
}

/// Biometric (or device credential) prompt succeeded
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_onAuthenticated(
    _env: JNIEnv,
    _class: JClass,
) {
    if let Some(ref app) = *APP.lock() {
        app.on_authenticated();
    }
}

/// Sign up or log in; returns one of [`login_codes`]
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_completeLogin(
    mut env: JNIEnv,
    _class: JClass,
    email: JString,
) -> jint {
    let email = read_string(&mut env, &email).unwrap_or_default();

    let guard = APP.lock();
    let app = match guard.as_ref() {
        Some(app) => app,
        None => return login_codes::NOT_OPEN,
    };

    match app.complete_login(&email) {
        Ok(LoginOutcome::SignedUp) => login_codes::SIGNED_UP,
        Ok(LoginOutcome::LoggedIn { .. }) => login_codes::LOGGED_IN,
        Err(VaultError::InvalidEmail) => login_codes::INVALID_EMAIL,
        Err(e) if e.requires_reauthentication() => login_codes::AUTHENTICATION_REQUIRED,
        Err(e) if e.is_security_critical() => {
            log::warn!("login rejected: {}", e);
            login_codes::REJECTED
        }
        Err(e) => {
            log::error!("login failed: {}", e);
            login_codes::FAILED
        }
    }
}

/// Seal a report; returns its id, or null on failure
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_submitReport(
    mut env: JNIEnv,
    _class: JClass,
    category: JString,
    text: JString,
) -> jstring {
    let (category, text) = match (
        read_string(&mut env, &category),
        read_string(&mut env, &text),
    ) {
        (Some(c), Some(t)) => (c, t),
        _ => return std::ptr::null_mut(),
    };

    let receipt = {
        let guard = APP.lock();
        match guard.as_ref().map(|app| app.submit_report(&category, &text)) {
            Some(Ok(receipt)) => receipt,
            Some(Err(e)) => {
                log::error!("report failed: {}", e);
                return std::ptr::null_mut();
            }
            None => return std::ptr::null_mut(),
        }
    };

    match env.new_string(receipt.report_id.to_string()) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// JPEG signature check over the selected image's bytes
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_isValidJpeg(
    env: JNIEnv,
    _class: JClass,
    data: JByteArray,
) -> jboolean {
    let data = match env.convert_byte_array(&data) {
        Ok(d) => d,
        Err(_) => return JNI_FALSE,
    };

    let guard = APP.lock();
    let valid = match guard.as_ref() {
        Some(app) => app.validate_image(&mut Cursor::new(data)).unwrap_or(false),
        None => false,
    };
    to_jboolean(valid)
}

/// Reports saved this session
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_reportCount(
    _env: JNIEnv,
    _class: JClass,
) -> jlong {
    let guard = APP.lock();
    guard.as_ref().map_or(0, |app| app.report_count() as jlong)
}

/// Clear the cache directory (report screen paused); returns files removed
#[no_mangle]
pub extern "system" fn Java_com_snitcher_NativeSnitcher_purgeCache(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    let guard = APP.lock();
    match guard.as_ref().map(|app| app.purge_cache()) {
        Some(Ok(removed)) => removed as jint,
        Some(Err(e)) => {
            log::warn!("cache purge failed: {}", e);
            -1
        }
        None => -1,
    }
}
