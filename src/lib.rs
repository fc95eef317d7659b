pub mod libtestownik;
