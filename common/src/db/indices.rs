use std::fmt::Debug;

macro_rules! define_index {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline(always)]
            pub fn new(id: usize) -> Self {
                Self(id as u32)
            }
            #[inline(always)]
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_index!(VertexId);
define_index!(NetId);
define_index!(PinId);
define_index!(ConnectionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_and_formats() {
        let v = VertexId::new(42);
        assert_eq!(v.index(), 42);
        assert_eq!(format!("{:?}", v), "VertexId(42)");
        assert!(NetId::new(1) < NetId::new(2));
    }
}
