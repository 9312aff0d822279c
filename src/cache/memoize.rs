//! Memoization through the cache manager
//!
//! [`Memoize`] turns a function call into a `get_or_compute` on a key built
//! from the function identity and its arguments. Arguments that are
//! request-scoped plumbing (database sessions, connection handles) are left
//! out of the key: their types opt in via [`CacheKeyArg::is_session_handle`],
//! usually through the [`session_handle!`](crate::session_handle) macro.
//!
//! ```ignore
//! struct Db;
//! cache_multi::session_handle!(Db);
//!
//! fn meals_for_week(db: &Db, week: u32) -> Vec<String> { /* query */ }
//!
//! let memo = Memoize::of(&meals_for_week).ttl(Duration::from_secs(600)).tag("meals");
//! let meals: Vec<String> = cache_multi::memoize!(memo, &cache, meals_for_week(&db, week));
//! ```
//!
//! [`Memoize::call`] is the lower-level form for keyword arguments or a
//! compute closure that is not a plain function call.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::global::global;
use super::manager::{CacheManager, SetOptions};

/// A value that can contribute to a memoization key
pub trait CacheKeyArg {
    /// Stable textual rendering used inside the key
    fn cache_key_fragment(&self) -> String;

    /// Request-scoped handles are excluded from the key
    fn is_session_handle(&self) -> bool {
        false
    }
}

impl<T: CacheKeyArg + ?Sized> CacheKeyArg for &T {
    fn cache_key_fragment(&self) -> String {
        (**self).cache_key_fragment()
    }

    fn is_session_handle(&self) -> bool {
        (**self).is_session_handle()
    }
}

macro_rules! display_key_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheKeyArg for $ty {
                fn cache_key_fragment(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key_arg!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    chrono::NaiveDate,
    chrono::DateTime<chrono::Utc>,
);

impl CacheKeyArg for str {
    fn cache_key_fragment(&self) -> String {
        format!("{:?}", self)
    }
}

impl CacheKeyArg for String {
    fn cache_key_fragment(&self) -> String {
        self.as_str().cache_key_fragment()
    }
}

impl CacheKeyArg for serde_json::Value {
    fn cache_key_fragment(&self) -> String {
        self.to_string()
    }
}

impl<T: CacheKeyArg> CacheKeyArg for Option<T> {
    fn cache_key_fragment(&self) -> String {
        match self {
            Some(v) => v.cache_key_fragment(),
            None => "None".to_string(),
        }
    }
}

impl<T: CacheKeyArg> CacheKeyArg for [T] {
    fn cache_key_fragment(&self) -> String {
        let parts: Vec<String> = self.iter().map(CacheKeyArg::cache_key_fragment).collect();
        format!("[{}]", parts.join(","))
    }
}

impl<T: CacheKeyArg> CacheKeyArg for Vec<T> {
    fn cache_key_fragment(&self) -> String {
        self.as_slice().cache_key_fragment()
    }
}

/// Mark types as request-scoped handles excluded from memoization keys
#[macro_export]
macro_rules! session_handle {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::cache::CacheKeyArg for $ty {
                fn cache_key_fragment(&self) -> String {
                    String::new()
                }

                fn is_session_handle(&self) -> bool {
                    true
                }
            }
        )+
    };
}

/// A tuple of call arguments that renders into a key and can be applied
/// to a function taking those arguments
pub trait CallArgs<F, T> {
    /// The arguments as key fragments, in order
    fn key_args(&self) -> Vec<&dyn CacheKeyArg>;

    /// Call `function` with the arguments
    fn apply(self, function: F) -> T;
}

macro_rules! tuple_call_args {
    ($($ty:ident $arg:ident),*) => {
        impl<Func, T, $($ty: CacheKeyArg),*> CallArgs<Func, T> for ($($ty,)*)
        where
            Func: FnOnce($($ty),*) -> T,
        {
            fn key_args(&self) -> Vec<&dyn CacheKeyArg> {
                let ($($arg,)*) = self;
                vec![$($arg as &dyn CacheKeyArg),*]
            }

            fn apply(self, function: Func) -> T {
                let ($($arg,)*) = self;
                function($($arg),*)
            }
        }
    };
}

tuple_call_args!();
tuple_call_args!(A a);
tuple_call_args!(A a, B b);
tuple_call_args!(A a, B b, C c);
tuple_call_args!(A a, B b, C c, D d);
tuple_call_args!(A a, B b, C c, D d, E e);
tuple_call_args!(A a, B b, C c, D d, E e, G g);

/// Memoize a plain function call: `memoize!(memo, &cache, f(a, b))`.
///
/// Each argument is evaluated once; the same values build the key and are
/// passed to the function on a miss.
#[macro_export]
macro_rules! memoize {
    ($memo:expr, $cache:expr, $($function:ident)::+ ( $($arg:expr),* $(,)? )) => {
        $memo.call_with($cache, ($($arg,)*), $($function)::+)
    };
}

/// Keyword argument names that never enter a key
const EXCLUDED_KWARGS: [&str; 2] = ["db", "session"];

/// Memoizes calls through a [`CacheManager`]
#[derive(Debug, Clone)]
pub struct Memoize {
    prefix: String,
    options: SetOptions,
}

impl Memoize {
    /// Memoize under an explicit key prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            options: SetOptions::default(),
        }
    }

    /// Memoize using the function's path as the prefix.
    ///
    /// Closures defined in the same function share a name; give those an
    /// explicit prefix with [`Memoize::new`].
    pub fn of<F>(_function: &F) -> Self {
        Self::new(std::any::type_name::<F>())
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.options.tags.push(tag.into());
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.options.persistent = persistent;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn options(&self) -> &SetOptions {
        &self.options
    }

    /// Build the cache key for one call
    pub fn key(&self, args: &[&dyn CacheKeyArg], kwargs: &[(&str, &dyn CacheKeyArg)]) -> String {
        let positional: Vec<String> = args
            .iter()
            .filter(|a| !a.is_session_handle())
            .map(|a| a.cache_key_fragment())
            .collect();

        let mut named: Vec<(&str, String)> = kwargs
            .iter()
            .filter(|(name, v)| !EXCLUDED_KWARGS.contains(name) && !v.is_session_handle())
            .map(|(name, v)| (*name, v.cache_key_fragment()))
            .collect();
        named.sort_by(|a, b| a.0.cmp(b.0));
        let named: Vec<String> = named
            .into_iter()
            .map(|(name, v)| format!("{}={}", name, v))
            .collect();

        format!("{}:{}:{}", self.prefix, positional.join(","), named.join(","))
    }

    /// Return the memoized result for these arguments, running `compute`
    /// on a miss
    pub fn call<T, F>(
        &self,
        cache: &CacheManager,
        args: &[&dyn CacheKeyArg],
        kwargs: &[(&str, &dyn CacheKeyArg)],
        compute: F,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = self.key(args, kwargs);
        cache.get_or_compute(&key, compute, &self.options)
    }

    /// Memoize `function(args...)`; the key is built from `args`.
    ///
    /// Usually reached through [`memoize!`](crate::memoize).
    pub fn call_with<A, F, T>(&self, cache: &CacheManager, args: A, function: F) -> T
    where
        A: CallArgs<F, T>,
        T: Serialize + DeserializeOwned,
    {
        let key = self.key(&args.key_args(), &[]);
        cache.get_or_compute(&key, move || args.apply(function), &self.options)
    }

    /// [`Memoize::call`] against the process-wide cache
    pub fn call_global<T, F>(
        &self,
        args: &[&dyn CacheKeyArg],
        kwargs: &[(&str, &dyn CacheKeyArg)],
        compute: F,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.call(global(), args, kwargs, compute)
    }
}

// =============================================================================
// Tests
// =============================================================================
